//! # Cache Types
//!
//! This module defines common types used across the caching system.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Metadata stored alongside each cached resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// Content type of the resource, when the origin reported one
    pub content_type: Option<String>,
    /// Size of the cached resource in bytes
    pub size: u64,
    /// When the resource was written, seconds since the Unix epoch
    pub modified: u64,
}

impl ResourceMetadata {
    /// Create new metadata for a resource, stamped with the current time
    pub fn new(size: u64) -> Self {
        Self {
            content_type: None,
            size,
            modified: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the content type as an Option
    pub fn with_content_type_option(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }
}

/// Result of a store operation
pub type StoreResult<T> = std::result::Result<T, std::io::Error>;

/// A type representing the result of a store lookup operation
pub type StoreLookup = StoreResult<Option<(Bytes, ResourceMetadata)>>;
