//! # Cache Store Record
//!
//! The server-side record of one named cache store: its lifecycle state and
//! the backend handle requests use for lookups and write-backs.

use std::sync::Arc;

use tracing::{debug, info};

use super::StoreBackend;

/// Lifecycle state of a cache store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// The backend open is in flight; lookups and writes are not yet permitted
    Opening,
    /// The store is usable
    Ready,
    /// The backend open failed; the store never became usable
    Failed,
}

/// A named cache store owned by the content server
pub struct CacheStore {
    name: String,
    state: StoreState,
    backend: Arc<dyn StoreBackend>,
}

impl CacheStore {
    /// Create a record for a store whose open is about to be dispatched
    pub fn new(name: impl Into<String>, backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            name: name.into(),
            state: StoreState::Opening,
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Whether lookups and writes are permitted
    pub fn is_ready(&self) -> bool {
        self.state == StoreState::Ready
    }

    pub fn mark_ready(&mut self) {
        debug!(name = %self.name, "Store ready");
        self.state = StoreState::Ready;
    }

    pub fn mark_failed(&mut self) {
        debug!(name = %self.name, "Store open failed");
        self.state = StoreState::Failed;
    }

    /// Whether a new open attempt should be dispatched for this record
    pub fn reopen_pending(&mut self) -> bool {
        if self.state == StoreState::Failed {
            self.state = StoreState::Opening;
            return true;
        }
        false
    }

    /// Handle for requests to perform lookups and write-backs against
    pub fn backend(&self) -> Arc<dyn StoreBackend> {
        Arc::clone(&self.backend)
    }

    /// Announce that the store is closing so the owner evicts the record.
    ///
    /// The underlying handle is released when the last request holding a
    /// backend clone terminates.
    pub fn close(&self) {
        info!(name = %self.name, "Store closing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DiskStore;
    use std::sync::Arc;

    fn store() -> CacheStore {
        CacheStore::new("assets", Arc::new(DiskStore::new("/tmp/depot-test", "assets")))
    }

    #[test]
    fn test_lifecycle_states() {
        let mut store = store();
        assert_eq!(store.name(), "assets");
        assert_eq!(store.state(), StoreState::Opening);
        assert!(!store.is_ready());

        store.mark_ready();
        assert!(store.is_ready());

        // A ready store has no reopen to dispatch
        assert!(!store.reopen_pending());
    }

    #[test]
    fn test_failed_store_reopens_once() {
        let mut store = store();
        store.mark_failed();
        assert_eq!(store.state(), StoreState::Failed);

        // First caller flips the record back to Opening, later callers see
        // the open already pending
        assert!(store.reopen_pending());
        assert_eq!(store.state(), StoreState::Opening);
        assert!(!store.reopen_pending());
    }
}
