//! Blob store abstraction for job artifacts.
//!
//! The pipeline addresses every artifact by a flat string key (see
//! `vodforge_common::keys` for the layout). Two backends are provided:
//! [`FsStore`] persists blobs as files under a root directory, and
//! [`MemoryStore`] keeps them in a concurrent map for tests.
//!
//! Puts are unconditional overwrites. That is load-bearing for the pipeline:
//! re-executing a task writes the same bytes to the same key, so duplicate
//! delivery converges instead of erroring.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use bytes::Bytes;

/// Result type alias using the store Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested key does not exist.
    #[error("blob not found: {key}")]
    NotFound { key: String },

    /// The key is empty or escapes the store root.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(key: S) -> Self {
        Self::NotFound { key: key.into() }
    }
}

/// Object storage interface consumed by the pipeline.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob at `key`, overwriting any existing blob.
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Fetch the blob at `key`.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Delete the blob at `key`. Deleting a missing key is a no-op.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List all keys starting with `prefix`, in unspecified order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Whether a blob exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
