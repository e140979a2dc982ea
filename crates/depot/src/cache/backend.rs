//! # Store Backend
//!
//! This module defines the key-value contract every cache store
//! implementation must follow.

use async_trait::async_trait;
use bytes::Bytes;

use crate::cache::types::{ResourceMetadata, StoreLookup, StoreResult};

/// A trait for store backends that persist cached resources
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Connect to or create the underlying store, including its metadata and
    /// file-data partitions
    async fn open(&self) -> StoreResult<()>;

    /// Get an entry from the store; `None` on a miss
    async fn get(&self, key: &str) -> StoreLookup;

    /// Put an entry into the store, writing both partitions as one atomic unit
    async fn put(&self, key: &str, data: Bytes, metadata: ResourceMetadata) -> StoreResult<()>;
}
