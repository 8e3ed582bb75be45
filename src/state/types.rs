use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vodforge_common::JobId;

/// Lifecycle status of a transcoding job.
///
/// The coordinator only moves forward through this list; `Failed` is
/// reachable from any non-terminal state on critical-path exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    SourceReady,
    MetadataReady,
    Branching,
    AwaitingFanIn,
    Finalizing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `next` is a legal transition from this status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == JobStatus::Failed {
            return true;
        }
        matches!(
            (self, next),
            (Self::Created, Self::SourceReady)
                | (Self::SourceReady, Self::MetadataReady)
                | (Self::MetadataReady, Self::Branching)
                | (Self::Branching, Self::AwaitingFanIn)
                | (Self::AwaitingFanIn, Self::Finalizing)
                | (Self::Finalizing, Self::Completed)
        )
    }
}

/// A tracked transcoding job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoJob {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Stage and message of the failure, for Failed jobs.
    pub error: Option<String>,
}

impl VideoJob {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Created,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}
