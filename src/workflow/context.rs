//! Per-job execution context.

use crate::config::PipelineConfig;
use crate::state::JobRegistry;
use std::sync::Arc;
use std::time::Duration;
use vodforge_codec::MediaCodec;
use vodforge_common::{Error, JobId};
use vodforge_engine::{EngineError, LocalEngine, RetryPolicy, TaskSpec};
use vodforge_store::BlobStore;

/// Dispatch specs per task type. Timeouts are per task type, distinct from
/// any job-level deadline; the enhancement deadline never gates the critical
/// path.
#[derive(Debug, Clone)]
pub struct TaskSpecs {
    pub acquire: TaskSpec,
    pub probe: TaskSpec,
    pub split: TaskSpec,
    pub transcode: TaskSpec,
    pub enhancement: TaskSpec,
}

impl TaskSpecs {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let retry = RetryPolicy {
            initial_interval: Duration::from_secs(config.initial_retry_secs),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(config.max_retry_secs),
            maximum_attempts: config.max_attempts,
        };

        Self {
            acquire: TaskSpec::new(
                "acquire",
                Duration::from_secs(config.acquire_timeout_secs),
                retry.clone(),
            ),
            probe: TaskSpec::new(
                "probe",
                Duration::from_secs(config.probe_timeout_secs),
                retry.clone(),
            ),
            // A failed split is fatal; retrying a deterministic demux
            // failure only delays the verdict.
            split: TaskSpec::new(
                "split",
                Duration::from_secs(config.split_timeout_secs),
                RetryPolicy::none(),
            ),
            transcode: TaskSpec::new(
                "transcode",
                Duration::from_secs(config.transcode_timeout_secs),
                retry.clone(),
            ),
            enhancement: TaskSpec::new(
                "enhancement",
                Duration::from_secs(config.enhancement_timeout_secs),
                retry,
            ),
        }
    }
}

/// Everything a stage needs to run: collaborators, dispatch specs, and the
/// job identity. Cloning is cheap; all members are shared handles.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub store: Arc<dyn BlobStore>,
    pub codec: Arc<dyn MediaCodec>,
    pub engine: LocalEngine,
    pub registry: JobRegistry,
    pub specs: Arc<TaskSpecs>,
    /// Target chunk duration in seconds.
    pub chunk_secs: f64,
}

/// Unwrap a dispatch failure back into the task's own error domain.
///
/// Exhaustion carries the task's final error (with its identifying payload);
/// timeouts and cancellation have no task error, so the caller supplies the
/// stage-appropriate wrapper.
pub fn engine_error_to_task(
    error: EngineError,
    fallback: impl FnOnce(String) -> Error,
) -> Error {
    match error {
        EngineError::Exhausted { source, .. } => source,
        other => fallback(other.to_string()),
    }
}
