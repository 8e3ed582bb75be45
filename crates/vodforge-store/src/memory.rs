//! In-memory blob store backed by a concurrent map.

use crate::{BlobStore, Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

/// Concurrent in-memory store, used by tests and for dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: DashMap<String, Bytes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidKey("empty key".to_string()));
        }
        self.blobs.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.blobs
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        store.put("a/b", Bytes::from_static(b"data")).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Bytes::from_static(b"data"));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get("missing").await,
            Err(Error::NotFound { .. })
        ));
        assert!(!store.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryStore::new();
        store.put("k", Bytes::from_static(b"one")).await.unwrap();
        store.put("k", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Bytes::from_static(b"two"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.put("k", Bytes::from_static(b"v")).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let store = MemoryStore::new();
        store.put("job/chunks/0", Bytes::new()).await.unwrap();
        store.put("job/chunks/1", Bytes::new()).await.unwrap();
        store.put("job/outputs/x", Bytes::new()).await.unwrap();

        let mut keys = store.list("job/chunks/").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["job/chunks/0", "job/chunks/1"]);
    }
}
