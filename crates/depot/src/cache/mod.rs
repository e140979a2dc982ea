//! # Cache System
//!
//! This module provides the durable, named cache stores backing resource
//! requests. Each store is a key-value directory with two partitions:
//! metadata (resource name → type, size, modified) and file data (resource
//! name → raw bytes). Write-backs are atomic per entry; lookups tolerate
//! damaged entries by treating them as misses.

// Module declarations
mod backend;
mod disk;
mod store;
mod types;

// Re-export primary types from our various modules
pub use backend::StoreBackend;
pub use disk::DiskStore;
pub use store::{CacheStore, StoreState};
pub use types::{ResourceMetadata, StoreLookup, StoreResult};
