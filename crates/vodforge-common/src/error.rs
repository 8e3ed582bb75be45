//! Pipeline error taxonomy.
//!
//! Errors are split along two axes: which stage they originate from, and
//! whether the stage may be retried before the job is failed. Critical-path
//! errors carry enough payload to identify the failing unit of work (e.g.
//! chunk 3 / 480p).

use crate::types::{EnhancementKind, Resolution};

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a transcoding job.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid processing options. Fatal, never retried.
    #[error("invalid options: {0}")]
    Config(String),

    /// Source acquisition failed. Retryable, then fatal.
    #[error("source acquisition failed: {0}")]
    Acquisition(String),

    /// Metadata probe failed. Retryable, then fatal.
    #[error("metadata probe failed: {0}")]
    Metadata(String),

    /// The source could not be demuxed into chunks. Fatal: without a
    /// manifest nothing downstream can proceed.
    #[error("failed to split source into chunks: {0}")]
    Split(String),

    /// A single (chunk, resolution) transcode failed. Retryable per task;
    /// retry exhaustion fails the whole job.
    #[error("transcode failed for chunk {chunk_index} / {resolution}: {message}")]
    Transcode {
        chunk_index: u32,
        resolution: Resolution,
        message: String,
    },

    /// An enhancement branch failed. Always absorbed at the branch boundary.
    #[error("{kind} enhancement failed: {message}")]
    Enhancement {
        kind: EnhancementKind,
        message: String,
    },

    /// Playlist assembly failed. Defensive: unreachable when upstream
    /// invariants hold, fatal if it occurs.
    #[error("playlist assembly failed: {0}")]
    Assembly(String),

    /// Transient chunk cleanup failed. Best-effort, logged, never fatal.
    #[error("cleanup failed: {0}")]
    Cleanup(String),

    /// A blob store operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new Config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new Acquisition error.
    pub fn acquisition<S: Into<String>>(msg: S) -> Self {
        Self::Acquisition(msg.into())
    }

    /// Create a new Metadata error.
    pub fn metadata<S: Into<String>>(msg: S) -> Self {
        Self::Metadata(msg.into())
    }

    /// Create a new Split error.
    pub fn split<S: Into<String>>(msg: S) -> Self {
        Self::Split(msg.into())
    }

    /// Create a new Transcode error identifying the failing pair.
    pub fn transcode<S: Into<String>>(chunk_index: u32, resolution: Resolution, msg: S) -> Self {
        Self::Transcode {
            chunk_index,
            resolution,
            message: msg.into(),
        }
    }

    /// Create a new Enhancement error.
    pub fn enhancement<S: Into<String>>(kind: EnhancementKind, msg: S) -> Self {
        Self::Enhancement {
            kind,
            message: msg.into(),
        }
    }

    /// Create a new Assembly error.
    pub fn assembly<S: Into<String>>(msg: S) -> Self {
        Self::Assembly(msg.into())
    }

    /// Create a new Cleanup error.
    pub fn cleanup<S: Into<String>>(msg: S) -> Self {
        Self::Cleanup(msg.into())
    }

    /// Create a new Storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether the dispatcher may retry the failed task before giving up.
    ///
    /// Config, Split, and Assembly failures are deterministic: retrying them
    /// reproduces the same failure, so they short-circuit straight to fatal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Split(_) | Self::Assembly(_) | Self::Cleanup(_) => false,
            Self::Acquisition(_)
            | Self::Metadata(_)
            | Self::Transcode { .. }
            | Self::Enhancement { .. }
            | Self::Storage(_)
            | Self::Io(_) => true,
        }
    }

    /// The pipeline stage this error originated from, for completion records
    /// and log context.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Config(_) => "options",
            Self::Acquisition(_) => "acquire",
            Self::Metadata(_) => "probe",
            Self::Split(_) => "split",
            Self::Transcode { .. } => "transcode",
            Self::Enhancement { kind, .. } => match kind {
                EnhancementKind::Thumbnail => "thumbnail",
                EnhancementKind::Chapters => "chapters",
            },
            Self::Assembly(_) => "assemble",
            Self::Cleanup(_) => "cleanup",
            Self::Storage(_) | Self::Io(_) => "storage",
        }
    }
}
