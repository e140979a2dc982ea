//! # Message Protocol
//!
//! This module defines the command and notification vocabulary exchanged
//! between the content client and the content server. Both sides match
//! exhaustively on these tagged unions; the integer wire ids are the stable
//! discriminators of the envelope format.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Wire ids for client-to-server commands
pub mod command_id {
    pub const ADD_SERVER: u8 = 1;
    pub const REMOVE_SERVER: u8 = 2;
    pub const OPEN_CACHE: u8 = 3;
    pub const DELETE_CACHE: u8 = 4;
    pub const GET_RESOURCE: u8 = 5;
}

/// Wire ids for server-to-client notifications
pub mod notification_id {
    pub const ERROR: u8 = 1;
    pub const CACHE_READY: u8 = 2;
    pub const PROGRESS: u8 = 3;
    pub const RESOURCE_DATA: u8 = 4;
}

/// How the caller wants the resource body materialized.
///
/// The engine always delivers raw bytes; the response type is carried through
/// unchanged so the application can interpret the payload on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    ArrayBuffer,
    Text,
    Blob,
    Json,
}

/// Arguments of a `GetResource` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceQuery {
    /// Caller-supplied correlation id, echoed on every notification for this request
    pub request_id: u64,
    /// Name of the cache store backing this request
    pub cache_name: String,
    /// Preferred origin URL; falls back to load-based selection when absent or unregistered
    #[serde(default)]
    pub preferred_server: Option<String>,
    /// Name of the resource to fetch
    pub resource_name: String,
    #[serde(default)]
    pub response_type: ResponseType,
    /// Whether to consult the cache before downloading
    #[serde(default = "default_return_cached")]
    pub return_cached: bool,
}

fn default_return_cached() -> bool {
    true
}

impl ResourceQuery {
    /// Create a query with default response type and cache lookup enabled
    pub fn new(
        request_id: u64,
        cache_name: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            cache_name: cache_name.into(),
            preferred_server: None,
            resource_name: resource_name.into(),
            response_type: ResponseType::default(),
            return_cached: true,
        }
    }

    /// Prefer a specific origin for this request
    pub fn with_preferred_server(mut self, url: impl Into<String>) -> Self {
        self.preferred_server = Some(url.into());
        self
    }

    /// Set the response type hint
    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Skip the cache lookup and always download
    pub fn with_return_cached(mut self, return_cached: bool) -> Self {
        self.return_cached = return_cached;
        self
    }
}

/// Commands sent from the content client to the content server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Register an origin
    AddServer { url: String },
    /// Unregister an origin
    RemoveServer { url: String },
    /// Open or create a named cache store
    OpenCache { name: String },
    /// Close and destroy a named cache store
    DeleteCache { name: String },
    /// Begin a resource fetch
    GetResource(ResourceQuery),
}

impl Command {
    /// Stable integer discriminator of this command on the wire
    pub const fn wire_id(&self) -> u8 {
        match self {
            Command::AddServer { .. } => command_id::ADD_SERVER,
            Command::RemoveServer { .. } => command_id::REMOVE_SERVER,
            Command::OpenCache { .. } => command_id::OPEN_CACHE,
            Command::DeleteCache { .. } => command_id::DELETE_CACHE,
            Command::GetResource(_) => command_id::GET_RESOURCE,
        }
    }
}

/// Successful fetch payload carried by `Notification::ResourceData`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePayload {
    pub request_id: u64,
    /// Full URL the resource was fetched from (origin + resource name)
    pub resource_url: String,
    pub resource_name: String,
    pub resource_data: Bytes,
    pub resource_type: ResponseType,
}

/// Notifications sent from the content server to the content client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Notification {
    /// An operation failed; carries the request id when the failure is
    /// correlated to a specific fetch
    Error {
        error: String,
        request_id: Option<u64>,
    },
    /// The named cache store is usable
    CacheReady { name: String },
    /// Fetch progress, percentage in [0, 100]
    Progress { request_id: u64, progress: u8 },
    /// A fetch succeeded
    ResourceData(ResourcePayload),
}

impl Notification {
    /// Stable integer discriminator of this notification on the wire
    pub const fn wire_id(&self) -> u8 {
        match self {
            Notification::Error { .. } => notification_id::ERROR,
            Notification::CacheReady { .. } => notification_id::CACHE_READY,
            Notification::Progress { .. } => notification_id::PROGRESS,
            Notification::ResourceData(_) => notification_id::RESOURCE_DATA,
        }
    }

    /// The request id this notification is correlated to, if any
    pub fn request_id(&self) -> Option<u64> {
        match self {
            Notification::Error { request_id, .. } => *request_id,
            Notification::CacheReady { .. } => None,
            Notification::Progress { request_id, .. } => Some(*request_id),
            Notification::ResourceData(payload) => Some(payload.request_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_ids_are_stable() {
        assert_eq!(
            Command::AddServer {
                url: "http://a".into()
            }
            .wire_id(),
            1
        );
        assert_eq!(
            Command::RemoveServer {
                url: "http://a".into()
            }
            .wire_id(),
            2
        );
        assert_eq!(Command::OpenCache { name: "c".into() }.wire_id(), 3);
        assert_eq!(Command::DeleteCache { name: "c".into() }.wire_id(), 4);
        assert_eq!(
            Command::GetResource(ResourceQuery::new(1, "c", "r")).wire_id(),
            5
        );

        assert_eq!(
            Notification::Error {
                error: "e".into(),
                request_id: None
            }
            .wire_id(),
            1
        );
        assert_eq!(Notification::CacheReady { name: "c".into() }.wire_id(), 2);
        assert_eq!(
            Notification::Progress {
                request_id: 1,
                progress: 50
            }
            .wire_id(),
            3
        );
        assert_eq!(
            Notification::ResourceData(ResourcePayload {
                request_id: 1,
                resource_url: "http://a/r".into(),
                resource_name: "r".into(),
                resource_data: Bytes::from_static(b"x"),
                resource_type: ResponseType::ArrayBuffer,
            })
            .wire_id(),
            4
        );
    }

    #[test]
    fn test_get_resource_round_trip_with_defaults() {
        // A minimal query on the wire picks up the documented defaults
        let json = r#"{"GetResource":{"request_id":7,"cache_name":"assets","resource_name":"x.bin"}}"#;
        let command: Command = serde_json::from_str(json).unwrap();

        let Command::GetResource(query) = &command else {
            panic!("expected GetResource");
        };
        assert_eq!(query.request_id, 7);
        assert_eq!(query.cache_name, "assets");
        assert_eq!(query.resource_name, "x.bin");
        assert!(query.preferred_server.is_none());
        assert_eq!(query.response_type, ResponseType::ArrayBuffer);
        assert!(query.return_cached);

        // And survives a full round trip unchanged
        let encoded = serde_json::to_string(&command).unwrap();
        let decoded: Command = serde_json::from_str(&encoded).unwrap();
        let Command::GetResource(query) = decoded else {
            panic!("expected GetResource");
        };
        assert_eq!(query.request_id, 7);
        assert!(query.return_cached);
    }

    #[test]
    fn test_response_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&ResponseType::ArrayBuffer).unwrap(),
            r#""arraybuffer""#
        );
        assert_eq!(serde_json::to_string(&ResponseType::Text).unwrap(), r#""text""#);
    }

    #[test]
    fn test_notification_correlation() {
        let payload = Notification::Progress {
            request_id: 42,
            progress: 99,
        };
        assert_eq!(payload.request_id(), Some(42));

        let uncorrelated = Notification::CacheReady { name: "c".into() };
        assert_eq!(uncorrelated.request_id(), None);
    }
}
