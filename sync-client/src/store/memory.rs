//! In-memory state store.
//!
//! Clones share state, so a test can hand one clone to the engine and keep
//! another to inspect or mutate.

use super::{StateStore, StoreError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory state store for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    values: BTreeMap<String, String>,
    fail_next_write: Option<String>,
    fail_write_to: Option<(String, String)>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given pairs.
    pub fn with_values<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        store.lock().values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        store
    }

    /// Copy of every pair.
    pub fn dump(&self) -> BTreeMap<String, String> {
        self.lock().values.clone()
    }

    /// Cause the next `set()` or `remove()` to fail with the given error.
    pub fn fail_next_write(&self, error: &str) {
        self.lock().fail_next_write = Some(error.to_string());
    }

    /// Cause the next `set()` or `remove()` of `key` to fail with the given
    /// error. Writes to other keys go through.
    pub fn fail_write_to(&self, key: &str, error: &str) {
        self.lock().fail_write_to = Some((key.to_string(), error.to_string()));
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryStoreInner {
    fn check_write(&mut self, key: &str) -> Result<(), StoreError> {
        if let Some(error) = self.fail_next_write.take() {
            return Err(StoreError::Unavailable(error));
        }
        if let Some((target, error)) = self.fail_write_to.take() {
            if target == key {
                return Err(StoreError::Unavailable(error));
            }
            self.fail_write_to = Some((target, error));
        }
        Ok(())
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check_write(key)?;
        inner.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check_write(key)?;
        inner.values.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().values.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        // Removing again is fine.
        store.remove("a").unwrap();
    }

    #[test]
    fn clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("k", "v").unwrap();
        assert_eq!(other.keys().unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn forced_write_failure_is_one_shot() {
        let store = MemoryStore::with_values([("k", "v")]);
        store.fail_next_write("disk full");

        assert!(matches!(store.set("k", "w"), Err(StoreError::Unavailable(_))));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.set("k", "w").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("w"));
    }

    #[test]
    fn targeted_write_failure_hits_only_that_key() {
        let store = MemoryStore::new();
        store.fail_write_to("b", "disk full");

        store.set("a", "1").unwrap();
        assert!(matches!(store.remove("b"), Err(StoreError::Unavailable(_))));
        store.set("b", "2").unwrap();
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
    }
}
