//! Filesystem blob store.
//!
//! Keys map directly to paths under the store root, so the on-disk tree
//! mirrors the persisted key layout (`{job_id}/outputs/720p/...`). Operators
//! can point a web server straight at the root.

use crate::{BlobStore, Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};

/// Blob store rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// first put.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path, rejecting keys that would escape the root.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(Error::InvalidKey("empty key".to_string()));
        }
        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(Error::InvalidKey(key.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let key = path
                    .strip_prefix(&self.root)
                    .map_err(|_| Error::InvalidKey(path.display().to_string()))?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, store) = store();
        store
            .put("job/outputs/720p/playlist", Bytes::from_static(b"#EXTM3U"))
            .await
            .unwrap();
        let data = store.get("job/outputs/720p/playlist").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"#EXTM3U"));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.get("nope").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let (_dir, store) = store();
        assert!(matches!(
            store.get("../etc/passwd").await,
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            store.put("/abs", Bytes::new()).await,
            Err(Error::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (_dir, store) = store();
        store.put("j/chunks/source/chunk_0000", Bytes::new()).await.unwrap();
        store.put("j/chunks/source/chunk_0001", Bytes::new()).await.unwrap();
        store.put("j/outputs/master_playlist", Bytes::new()).await.unwrap();

        let mut chunks = store.list("j/chunks/").await.unwrap();
        chunks.sort();
        assert_eq!(
            chunks,
            vec!["j/chunks/source/chunk_0000", "j/chunks/source/chunk_0001"]
        );

        store.delete("j/chunks/source/chunk_0000").await.unwrap();
        store.delete("j/chunks/source/chunk_0000").await.unwrap();
        assert_eq!(store.list("j/chunks/").await.unwrap().len(), 1);
    }
}
