mod types;

pub use types::*;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use vodforge_common::JobId;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Job lifecycle event, broadcast to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job has been registered.
    JobCreated { id: JobId },
    /// A job moved to a new status.
    StatusChanged { id: JobId, status: JobStatus },
    /// A pipeline stage finished.
    StageCompleted {
        id: JobId,
        stage: String,
        elapsed_ms: u64,
    },
    /// A job completed successfully.
    JobCompleted { id: JobId },
    /// A job failed on the critical path.
    JobFailed {
        id: JobId,
        stage: String,
        error: String,
    },
}

/// In-memory registry of jobs plus an event broadcast channel.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    jobs: DashMap<JobId, VideoJob>,
    events: broadcast::Sender<JobEvent>,
}

impl JobRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RegistryInner {
                jobs: DashMap::new(),
                events,
            }),
        }
    }

    /// Subscribe to job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    fn broadcast(&self, event: JobEvent) {
        // No subscribers is fine; events are purely observational.
        let _ = self.inner.events.send(event);
    }

    /// Register a new job in `Created` status.
    pub fn create(&self, id: JobId) -> VideoJob {
        let job = VideoJob::new(id);
        self.inner.jobs.insert(id, job.clone());
        self.broadcast(JobEvent::JobCreated { id });
        job
    }

    /// Fetch a snapshot of a job.
    pub fn get(&self, id: JobId) -> Option<VideoJob> {
        self.inner.jobs.get(&id).map(|entry| entry.value().clone())
    }

    /// Whether the job has reached a terminal state. Unknown jobs count as
    /// terminal so late results for them are discarded.
    pub fn is_terminal(&self, id: JobId) -> bool {
        self.get(id).map(|job| job.status.is_terminal()).unwrap_or(true)
    }

    /// Move a job to `status`. Illegal transitions are logged and ignored;
    /// the coordinator is the only writer, so one indicates a bug there.
    pub fn transition(&self, id: JobId, status: JobStatus) {
        let Some(mut entry) = self.inner.jobs.get_mut(&id) else {
            tracing::warn!("transition for unknown job {id}");
            return;
        };
        if !entry.status.can_transition_to(status) {
            tracing::warn!(
                "illegal transition for job {id}: {:?} -> {:?}",
                entry.status,
                status
            );
            return;
        }
        entry.status = status;
        drop(entry);
        tracing::debug!("job {id} -> {status:?}");
        self.broadcast(JobEvent::StatusChanged { id, status });
    }

    /// Record a completed pipeline stage.
    pub fn stage_completed(&self, id: JobId, stage: &str, elapsed_ms: u64) {
        self.broadcast(JobEvent::StageCompleted {
            id,
            stage: stage.to_string(),
            elapsed_ms,
        });
    }

    /// Mark a job completed.
    pub fn complete(&self, id: JobId) {
        if let Some(mut entry) = self.inner.jobs.get_mut(&id) {
            if entry.status.can_transition_to(JobStatus::Completed) {
                entry.status = JobStatus::Completed;
                entry.completed_at = Some(Utc::now());
            }
        }
        self.broadcast(JobEvent::StatusChanged {
            id,
            status: JobStatus::Completed,
        });
        self.broadcast(JobEvent::JobCompleted { id });
    }

    /// Mark a job failed, recording the originating stage and message.
    pub fn fail(&self, id: JobId, stage: &str, error: &str) {
        if let Some(mut entry) = self.inner.jobs.get_mut(&id) {
            if entry.status.can_transition_to(JobStatus::Failed) {
                entry.status = JobStatus::Failed;
                entry.completed_at = Some(Utc::now());
                entry.error = Some(format!("{stage}: {error}"));
            }
        }
        self.broadcast(JobEvent::JobFailed {
            id,
            stage: stage.to_string(),
            error: error.to_string(),
        });
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
