//! In-memory payload store using `DashMap`.
//!
//! The default backend - payloads are lost on process restart.

use super::KvStore;
use crate::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

/// In-memory payload store on a sharded concurrent hashmap.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    payloads: DashMap<String, Vec<u8>, FxBuildHasher>,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            payloads: DashMap::with_capacity_and_hasher(capacity, FxBuildHasher),
        }
    }

    /// Number of stored payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.payloads.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        match self.payloads.entry(key.to_string()) {
            Entry::Occupied(_) => Err(Error::Conflict(format!(
                "Payload key '{key}' is already in use"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.payloads.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.payloads.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_capacity() {
        let store = MemoryKvStore::with_capacity(16);
        assert!(store.is_empty());
        store.put("k", b"v".to_vec()).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
