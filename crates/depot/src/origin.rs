//! # Origin Management
//!
//! This module provides functionality for managing the set of registered
//! content origins. Each origin carries a load counter of currently-dispatched
//! requests; selection picks the least-loaded origin so concurrent fetches
//! spread across the available servers.

use crate::DepotError;
use tracing::debug;

/// A registered content origin (base URL) with its current load
#[derive(Debug, Clone)]
pub struct Origin {
    /// Base URL of the origin
    pub url: String,
    /// Number of dispatched, not-yet-terminated requests bound to this origin
    pub load: u32,
}

impl Origin {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            load: 0,
        }
    }
}

/// Registry of content origins with load-aware selection
///
/// Registration order is preserved: when several origins share the lowest
/// load value, the first registered wins, which keeps selection deterministic.
#[derive(Debug, Default)]
pub struct OriginRegistry {
    origins: Vec<Origin>,
}

impl OriginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            origins: Vec::new(),
        }
    }

    /// Register an origin; idempotent by URL equality
    pub fn add(&mut self, url: impl Into<String>) {
        let url = url.into();
        if self.origins.iter().any(|o| o.url == url) {
            debug!(url = %url, "Origin already registered");
            return;
        }
        debug!(url = %url, "Origin registered");
        self.origins.push(Origin::new(url));
    }

    /// Unregister an origin; no-op when absent.
    ///
    /// Requests already bound to the origin are unaffected and terminate
    /// normally.
    pub fn remove(&mut self, url: &str) {
        let before = self.origins.len();
        self.origins.retain(|o| o.url != url);
        if self.origins.len() < before {
            debug!(url = %url, "Origin removed");
        }
    }

    /// Check if there are any origins registered
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Get the number of registered origins
    pub fn count(&self) -> usize {
        self.origins.len()
    }

    /// Select an origin for the next request.
    ///
    /// A preferred URL wins when it is registered; otherwise the origin with
    /// the strictly lowest load value is returned, ties broken by registration
    /// order. Fails when the registry is empty.
    pub fn select(&self, preferred: Option<&str>) -> Result<String, DepotError> {
        if let Some(preferred) = preferred {
            if let Some(origin) = self.origins.iter().find(|o| o.url == preferred) {
                return Ok(origin.url.clone());
            }
            debug!(url = %preferred, "Preferred origin not registered, falling back to load-based selection");
        }

        // min_by_key keeps the first minimal element, so registration order
        // breaks ties
        self.origins
            .iter()
            .min_by_key(|o| o.load)
            .map(|o| o.url.clone())
            .ok_or(DepotError::NoOriginAvailable)
    }

    /// Record a request dispatched to an origin
    pub fn acquire(&mut self, url: &str) {
        if let Some(origin) = self.origins.iter_mut().find(|o| o.url == url) {
            origin.load += 1;
            debug!(url = %url, load = origin.load, "Origin load incremented");
        }
    }

    /// Record the termination of a request bound to an origin.
    ///
    /// A no-op when the origin was removed while the request was in flight;
    /// saturates at zero so the counter can never go negative.
    pub fn release(&mut self, url: &str) {
        if let Some(origin) = self.origins.iter_mut().find(|o| o.url == url) {
            origin.load = origin.load.saturating_sub(1);
            debug!(url = %url, load = origin.load, "Origin load decremented");
        }
    }

    /// Get the current load of an origin
    pub fn load_of(&self, url: &str) -> Option<u32> {
        self.origins.iter().find(|o| o.url == url).map(|o| o.load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let mut registry = OriginRegistry::new();
        registry.add("http://a");
        registry.add("http://a");
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let mut registry = OriginRegistry::new();
        registry.add("http://a");
        registry.remove("http://b");
        assert_eq!(registry.count(), 1);
        registry.remove("http://a");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_select_on_empty_registry_fails() {
        let registry = OriginRegistry::new();
        assert!(matches!(
            registry.select(None),
            Err(DepotError::NoOriginAvailable)
        ));
    }

    #[test]
    fn test_select_prefers_registered_url() {
        let mut registry = OriginRegistry::new();
        registry.add("http://a");
        registry.add("http://b");
        registry.acquire("http://a");

        // Preferred wins even when it carries the higher load
        assert_eq!(registry.select(Some("http://b")).unwrap(), "http://b");
        assert_eq!(registry.select(Some("http://a")).unwrap(), "http://a");
    }

    #[test]
    fn test_unregistered_preferred_falls_back_to_load() {
        let mut registry = OriginRegistry::new();
        registry.add("http://a");
        registry.add("http://b");
        registry.acquire("http://a");

        assert_eq!(registry.select(Some("http://c")).unwrap(), "http://b");
    }

    #[test]
    fn test_tie_break_is_registration_order() {
        let mut registry = OriginRegistry::new();
        registry.add("http://a");
        registry.add("http://b");

        // Both at load 0: first registered wins
        assert_eq!(registry.select(None).unwrap(), "http://a");

        registry.acquire("http://a");
        assert_eq!(registry.select(None).unwrap(), "http://b");

        // Back to a tie: first registered wins again
        registry.acquire("http://b");
        assert_eq!(registry.select(None).unwrap(), "http://a");
    }

    #[test]
    fn test_acquire_release_balance() {
        let mut registry = OriginRegistry::new();
        registry.add("http://a");

        for _ in 0..5 {
            registry.acquire("http://a");
        }
        assert_eq!(registry.load_of("http://a"), Some(5));
        for _ in 0..5 {
            registry.release("http://a");
        }
        assert_eq!(registry.load_of("http://a"), Some(0));

        // Saturates at zero
        registry.release("http://a");
        assert_eq!(registry.load_of("http://a"), Some(0));
    }

    #[test]
    fn test_release_after_remove_is_noop() {
        let mut registry = OriginRegistry::new();
        registry.add("http://a");
        registry.acquire("http://a");
        registry.remove("http://a");

        // The in-flight request terminates after removal; nothing to update
        registry.release("http://a");
        assert!(registry.load_of("http://a").is_none());
    }
}
