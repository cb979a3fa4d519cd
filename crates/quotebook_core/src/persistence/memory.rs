//! In-memory persistence adapter.
//!
//! Used for session-scoped state (lives as long as the process) and tests.

use super::{PersistenceAdapter, StorageError, StorageResult};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Process-lifetime key-value store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns stored keys in sorted order.
    pub fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl PersistenceAdapter for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStorage;
    use crate::persistence::PersistenceAdapter;

    #[test]
    fn set_get_remove_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("a").unwrap(), None);

        storage.set("a", b"one").unwrap();
        storage.set("a", b"two").unwrap();
        assert_eq!(storage.get("a").unwrap().as_deref(), Some(&b"two"[..]));

        storage.remove("a").unwrap();
        storage.remove("a").unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }
}
