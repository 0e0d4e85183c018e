//! Core domain model: artifacts, runs, stages, and approvals.

mod approval;
mod artifact;
mod run;
mod stage;

pub use approval::{ApprovalRequest, DecisionOutcome, DecisionStatus, GateResult};
pub use artifact::{Artifact, ArtifactKind, ArtifactStatus};
pub use run::{PipelineRun, RunStatus};
pub use stage::{ExecutionStatus, StageDefinition, StageExecution};
