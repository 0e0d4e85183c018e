//! Stage definitions and stage execution records.

use crate::core::artifact::ArtifactKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Static configuration for one transformation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Position of the stage in the pipeline. Indices are gap-free.
    pub order_index: usize,
    /// The artifact kind this stage consumes. `None` only for the first
    /// stage, which receives the run's initial artifact regardless.
    pub consumes: Option<ArtifactKind>,
    /// The artifact kind this stage produces.
    pub produces: ArtifactKind,
    /// How many approvals the output needs before the next stage may run.
    /// Zero means no gate is ever opened.
    pub required_approvals: usize,
    /// Stakeholders asked to sign off when a gate opens.
    pub stakeholders: Vec<String>,
    /// Key of the registered processor that performs the transformation.
    pub processor_key: String,
}

impl StageDefinition {
    /// Creates an ungated stage definition.
    #[must_use]
    pub fn new(
        order_index: usize,
        consumes: Option<ArtifactKind>,
        produces: ArtifactKind,
        processor_key: impl Into<String>,
    ) -> Self {
        Self {
            order_index,
            consumes,
            produces,
            required_approvals: 0,
            stakeholders: Vec::new(),
            processor_key: processor_key.into(),
        }
    }

    /// Sets the approval quorum and stakeholder panel.
    #[must_use]
    pub fn with_quorum(
        mut self,
        required: usize,
        stakeholders: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.required_approvals = required;
        self.stakeholders = stakeholders.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if the stage opens an approval gate after success.
    #[must_use]
    pub fn is_gated(&self) -> bool {
        self.required_approvals > 0
    }
}

/// The status of one stage execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The processor is being invoked.
    Running,
    /// The processor succeeded and an approval gate is open.
    WaitingApproval,
    /// Terminal success; the output artifact may feed the next stage.
    Completed,
    /// Terminal failure; the owning run fails.
    Failed,
}

impl ExecutionStatus {
    /// Returns true if the status can never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::WaitingApproval => write!(f, "waiting_approval"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One attempt to run one stage within one run.
///
/// Execution rows are append-only audit records: a retry is a new row on a
/// new run, never a mutation of a failed one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageExecution {
    /// Unique identifier.
    pub id: Uuid,
    /// The owning pipeline run.
    pub run_id: Uuid,
    /// The `order_index` of the stage definition this attempt executes.
    pub stage_index: usize,
    /// The artifact fed to the processor.
    pub input_artifact_id: Uuid,
    /// The artifact the processor produced, set on success.
    pub output_artifact_id: Option<Uuid>,
    /// Current state-machine position.
    pub status: ExecutionStatus,
    /// Free-form log payload (processor errors, gate outcomes).
    pub log: Vec<String>,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt reached a terminal status.
    pub ended_at: Option<DateTime<Utc>>,
}

impl StageExecution {
    /// Creates a new running execution record.
    #[must_use]
    pub fn new(run_id: Uuid, stage_index: usize, input_artifact_id: Uuid) -> Self {
        Self {
            id: crate::utils::generate_uuid(),
            run_id,
            stage_index,
            input_artifact_id,
            output_artifact_id: None,
            status: ExecutionStatus::Running,
            log: Vec::new(),
            started_at: crate::utils::now(),
            ended_at: None,
        }
    }
}
