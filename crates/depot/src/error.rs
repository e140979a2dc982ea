use reqwest::StatusCode;

// Custom error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum DepotError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(String),

    #[error("Server returned status code {0}")]
    StatusCode(StatusCode),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cache store '{0}' is not open or not ready")]
    CacheUnavailable(String),

    #[error("Failed to open cache store '{0}': {1}")]
    CacheOpenFailed(String, String),

    #[error("No origin available for request")]
    NoOriginAvailable,

    #[error("Request id {0} is already in flight")]
    DuplicateRequest(u64),

    #[error("Engine is not running")]
    Closed,
}
