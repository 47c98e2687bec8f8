//! Payload key-value backend behind the data locator
//!
//! Published payloads are write-once: a key is inserted exactly once and
//! only removed when the publish that created it is rolled back.
//!
//! # Example
//!
//! ```rust
//! use datastore_core::kv::{KvStore, MemoryKvStore};
//!
//! # async fn example() -> datastore_core::Result<()> {
//! let store = MemoryKvStore::new();
//!
//! store.put("source/0", b"payload".to_vec()).await?;
//! assert_eq!(store.get("source/0").await?, Some(b"payload".to_vec()));
//! assert!(store.put("source/0", b"again".to_vec()).await.is_err());
//!
//! assert!(store.delete("source/0").await?);
//! assert!(!store.exists("source/0").await?);
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryKvStore;

use crate::Result;
use std::future::Future;

/// Storage for encoded payloads, keyed by moniker storage key.
///
/// Implementations must be safe to share across tasks; every method is a
/// self-contained unit of work.
pub trait KvStore: Send + Sync {
    /// Get a payload by key.
    ///
    /// Returns `None` if the key doesn't exist.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Insert a payload under a new key.
    ///
    /// Fails with `Conflict` if the key is already present.
    fn put(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Remove a payload. Returns whether it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Check if a key exists.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Get several payloads, in key order. Missing keys return `None`.
    fn batch_get(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<Option<Vec<u8>>>>> + Send {
        async move {
            let mut results = Vec::with_capacity(keys.len());
            for key in keys {
                results.push(self.get(key).await?);
            }
            Ok(results)
        }
    }

    /// Insert several payloads. If one insert fails, the ones already
    /// inserted by this call are removed before the error is returned.
    fn batch_put(&self, pairs: Vec<(String, Vec<u8>)>) -> impl Future<Output = Result<()>> + Send {
        async move {
            let mut inserted: Vec<String> = Vec::with_capacity(pairs.len());
            for (key, value) in pairs {
                if let Err(e) = self.put(&key, value).await {
                    for key in &inserted {
                        self.delete(key).await?;
                    }
                    return Err(e);
                }
                inserted.push(key);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryKvStore::new();

        store.put("a/0", b"value".to_vec()).await.unwrap();
        assert_eq!(store.get("a/0").await.unwrap(), Some(b"value".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_is_write_once() {
        let store = MemoryKvStore::new();

        store.put("a/0", b"first".to_vec()).await.unwrap();
        let second = store.put("a/0", b"second".to_vec()).await;

        assert!(matches!(second, Err(Error::Conflict(_))));
        assert_eq!(store.get("a/0").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let store = MemoryKvStore::new();

        store.put("a/0", vec![]).await.unwrap();
        assert!(store.delete("a/0").await.unwrap());
        assert!(!store.delete("a/0").await.unwrap());
        assert!(!store.exists("a/0").await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_get_preserves_order() {
        let store = MemoryKvStore::new();

        store.put("b", b"2".to_vec()).await.unwrap();
        store.put("a", b"1".to_vec()).await.unwrap();

        let keys = vec!["a".to_string(), "missing".to_string(), "b".to_string()];
        let results = store.batch_get(&keys).await.unwrap();

        assert_eq!(results, vec![Some(b"1".to_vec()), None, Some(b"2".to_vec())]);
    }

    #[tokio::test]
    async fn test_batch_put_rolls_back_on_conflict() {
        let store = MemoryKvStore::new();
        store.put("taken", b"x".to_vec()).await.unwrap();

        let result = store
            .batch_put(vec![
                ("new/0".to_string(), b"0".to_vec()),
                ("new/1".to_string(), b"1".to_vec()),
                ("taken".to_string(), b"2".to_vec()),
            ])
            .await;

        assert!(result.is_err());
        assert!(!store.exists("new/0").await.unwrap());
        assert!(!store.exists("new/1").await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        use std::sync::Arc;

        let store = Arc::new(MemoryKvStore::new());
        let mut handles = vec![];

        for i in 0..64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .put(&format!("source/{i}"), format!("v{i}").into_bytes())
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 64);
        assert_eq!(
            store.get("source/7").await.unwrap(),
            Some(b"v7".to_vec())
        );
    }
}
