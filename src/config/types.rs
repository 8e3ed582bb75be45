use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory of the filesystem blob store.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Target chunk duration in seconds.
    #[serde(default = "default_chunk_secs")]
    pub chunk_secs: f64,

    /// Maximum tasks running at once.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Attempts per retryable task, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in seconds.
    #[serde(default = "default_initial_retry_secs")]
    pub initial_retry_secs: u64,

    /// Cap on the delay between retries, in seconds.
    #[serde(default = "default_max_retry_secs")]
    pub max_retry_secs: u64,

    /// Deadline for storing the source, in seconds.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Deadline for the metadata probe, in seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Deadline for splitting the source, in seconds.
    #[serde(default = "default_split_timeout_secs")]
    pub split_timeout_secs: u64,

    /// Deadline per chunk transcode, in seconds.
    #[serde(default = "default_transcode_timeout_secs")]
    pub transcode_timeout_secs: u64,

    /// Deadline per enhancement task, in seconds. Enhancement deadlines
    /// never gate the critical path.
    #[serde(default = "default_enhancement_timeout_secs")]
    pub enhancement_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_secs: default_chunk_secs(),
            worker_concurrency: default_worker_concurrency(),
            max_attempts: default_max_attempts(),
            initial_retry_secs: default_initial_retry_secs(),
            max_retry_secs: default_max_retry_secs(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            split_timeout_secs: default_split_timeout_secs(),
            transcode_timeout_secs: default_transcode_timeout_secs(),
            enhancement_timeout_secs: default_enhancement_timeout_secs(),
        }
    }
}

fn default_chunk_secs() -> f64 {
    4.0
}

fn default_worker_concurrency() -> usize {
    8
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_retry_secs() -> u64 {
    2
}

fn default_max_retry_secs() -> u64 {
    30
}

fn default_acquire_timeout_secs() -> u64 {
    60
}

fn default_probe_timeout_secs() -> u64 {
    60
}

fn default_split_timeout_secs() -> u64 {
    300
}

fn default_transcode_timeout_secs() -> u64 {
    120
}

fn default_enhancement_timeout_secs() -> u64 {
    300
}
