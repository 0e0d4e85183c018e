//! Pipeline run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The lifecycle status of a pipeline run.
///
/// `Running` is the only non-terminal state; transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is in progress or suspended on an approval gate.
    Running,
    /// Every stage completed; `final_artifact_id` is set.
    Completed,
    /// A stage failed or a gate was rejected; no further stages execute.
    Failed,
}

impl RunStatus {
    /// Returns true if the status can never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One end-to-end execution instance of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique identifier.
    pub id: Uuid,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// The artifact the run was seeded with.
    pub initial_artifact_id: Uuid,
    /// The last stage's output once the run completes.
    pub final_artifact_id: Option<Uuid>,
    /// Failure description for failed runs.
    pub failure_reason: Option<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Creates a new running record seeded with the given artifact.
    #[must_use]
    pub fn new(initial_artifact_id: Uuid) -> Self {
        Self {
            id: crate::utils::generate_uuid(),
            status: RunStatus::Running,
            initial_artifact_id,
            final_artifact_id: None,
            failure_reason: None,
            started_at: crate::utils::now(),
            ended_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_running() {
        let run = PipelineRun::new(Uuid::new_v4());
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.final_artifact_id.is_none());
        assert!(run.ended_at.is_none());
    }

    #[test]
    fn test_run_status_terminality() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }
}
