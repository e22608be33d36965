//! Host environment the adapter runs in.
//!
//! The adapter needs two things from its host: the current page location
//! (to read launch parameters and to navigate away on sign-out) and the
//! session-scoped key/value storage the delegated library keeps its state in.
//! Browser hosts back these with `window.location` and `sessionStorage`;
//! the in-memory implementations here serve native hosts and tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use url::Url;

use crate::SmartResult;

/// Current page location.
pub trait Location: Send + Sync {
    /// Returns the full current URL.
    fn href(&self) -> Url;

    /// Navigates to `url`, replacing the current page.
    fn assign(&self, url: &Url);
}

/// Session-scoped key/value storage.
///
/// All operations are fallible: browsers deny storage access in private
/// modes and sandboxed frames.
pub trait SessionStore: Send + Sync {
    /// Lists all keys currently stored.
    fn keys(&self) -> SmartResult<Vec<String>>;

    /// Reads a value.
    fn get_item(&self, key: &str) -> SmartResult<Option<String>>;

    /// Writes a value.
    fn set_item(&self, key: &str, value: &str) -> SmartResult<()>;

    /// Removes a value. Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> SmartResult<()>;
}

/// In-memory [`Location`].
#[derive(Debug)]
pub struct MemoryLocation {
    current: ArcSwap<Url>,
    navigations: AtomicU64,
}

impl MemoryLocation {
    /// Creates a location pointing at `url`.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            current: ArcSwap::from_pointee(url),
            navigations: AtomicU64::new(0),
        }
    }

    /// Number of times [`Location::assign`] has been called.
    #[must_use]
    pub fn navigation_count(&self) -> u64 {
        self.navigations.load(Ordering::Relaxed)
    }
}

impl Location for MemoryLocation {
    fn href(&self) -> Url {
        (**self.current.load()).clone()
    }

    fn assign(&self, url: &Url) {
        self.current.store(Arc::new(url.clone()));
        self.navigations.fetch_add(1, Ordering::Relaxed);
    }
}

/// In-memory [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    items: DashMap<String, String>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn keys(&self) -> SmartResult<Vec<String>> {
        Ok(self.items.iter().map(|entry| entry.key().clone()).collect())
    }

    fn get_item(&self, key: &str) -> SmartResult<Option<String>> {
        Ok(self.items.get(key).map(|value| value.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> SmartResult<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> SmartResult<()> {
        self.items.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_location_assign() {
        let location = MemoryLocation::new(Url::parse("https://app.example.com/?a=1").unwrap());
        assert_eq!(location.navigation_count(), 0);

        let next = Url::parse("https://app.example.com/").unwrap();
        location.assign(&next);

        assert_eq!(location.href(), next);
        assert_eq!(location.navigation_count(), 1);
    }

    #[test]
    fn test_memory_session_store() {
        let store = MemorySessionStore::new();
        assert!(store.is_empty());

        store.set_item("SMART_KEY", "\"abc\"").unwrap();
        store.set_item("abc", "{}").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_item("SMART_KEY").unwrap().as_deref(), Some("\"abc\""));

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["SMART_KEY".to_string(), "abc".to_string()]);

        store.remove_item("SMART_KEY").unwrap();
        store.remove_item("missing").unwrap();
        assert_eq!(store.get_item("SMART_KEY").unwrap(), None);
        assert_eq!(store.len(), 1);
    }
}
