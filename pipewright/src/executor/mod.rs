//! Stage executor: runs one stage attempt end to end.

use crate::core::{ArtifactStatus, ExecutionStatus, GateResult, StageDefinition, StageExecution};
use crate::errors::{PipelineError, ValidationError};
use crate::gate::ApprovalGate;
use crate::processor::ProcessorRegistry;
use crate::store::{ArtifactStore, RunStore};
use std::sync::Arc;
use uuid::Uuid;

/// Runs a single stage: fetches the input artifact, invokes the registered
/// processor, persists the output, and opens an approval gate when the
/// stage requires one.
///
/// The execution record is created before the processor is invoked, so an
/// audit row exists even when the processor fails. Processor failure is not
/// an error of `start` itself — it is recorded on the returned `Failed`
/// execution and surfaces to the orchestrator, which fails the owning run.
/// A retry is a new `start` on a fresh run, never a mutation of the failed
/// row.
pub struct StageExecutor {
    artifacts: Arc<ArtifactStore>,
    runs: Arc<RunStore>,
    gate: Arc<ApprovalGate>,
    registry: Arc<ProcessorRegistry>,
}

impl StageExecutor {
    /// Creates a new executor over the shared stores.
    #[must_use]
    pub fn new(
        artifacts: Arc<ArtifactStore>,
        runs: Arc<RunStore>,
        gate: Arc<ApprovalGate>,
        registry: Arc<ProcessorRegistry>,
    ) -> Self {
        Self {
            artifacts,
            runs,
            gate,
            registry,
        }
    }

    /// Starts one stage attempt and drives it as far as it can go without
    /// external input: to `Completed` for ungated stages, `WaitingApproval`
    /// for gated ones, or `Failed` on processor error.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the input artifact kind does not match the
    /// stage's consumed kind, `InvalidState` if the stage already has a
    /// non-terminal attempt, and `NotFound` for missing records. Processor
    /// failures are recorded, not returned.
    pub async fn start(
        &self,
        run_id: Uuid,
        stage: &StageDefinition,
        input_artifact_id: Uuid,
    ) -> Result<StageExecution, PipelineError> {
        let input = self.artifacts.get(input_artifact_id)?;
        if let Some(expected) = stage.consumes {
            if input.kind != expected {
                return Err(ValidationError::new(format!(
                    "stage {} consumes {expected}, got {}",
                    stage.order_index, input.kind
                ))
                .with_entity(input_artifact_id)
                .into());
            }
        }

        // Audit row first; everything after this is recorded on it.
        let execution = self
            .runs
            .create_execution(run_id, stage.order_index, input_artifact_id)?;

        let processor = match self.registry.resolve(&stage.processor_key) {
            Ok(p) => p,
            Err(err) => return self.record_failure(execution.id, &err.to_string()),
        };

        let output_content = match processor.process(&input.content).await {
            Ok(content) => content,
            Err(err) => {
                tracing::error!(
                    execution_id = %execution.id,
                    processor = %stage.processor_key,
                    error = %err,
                    "Stage processor failed"
                );
                return self.record_failure(execution.id, &err.to_string());
            }
        };

        let output = match self.artifacts.create(
            stage.produces,
            output_content,
            Some(input_artifact_id),
            &stage.processor_key,
        ) {
            Ok(artifact) => artifact,
            Err(err) => {
                self.record_failure(execution.id, &err.to_string())?;
                return Err(err);
            }
        };
        self.runs
            .append_log(execution.id, format!("produced artifact {}", output.id))?;

        if stage.is_gated() {
            if let Err(err) =
                self.gate
                    .open(execution.id, &stage.stakeholders, stage.required_approvals)
            {
                self.record_failure(execution.id, &err.to_string())?;
                return Err(err);
            }
            self.artifacts
                .set_status(output.id, ArtifactStatus::PendingApproval, None)?;
            self.runs.mark_waiting_approval(execution.id, output.id)
        } else {
            self.runs.mark_completed(execution.id, Some(output.id))
        }
    }

    /// Advances a `WaitingApproval` execution whose gate is satisfied.
    ///
    /// Calling this while the gate is still pending (or after the execution
    /// already completed) is a no-op, so out-of-order polling by the
    /// scheduler is harmless.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown execution and `InvalidState` if
    /// the execution failed.
    pub fn advance(&self, execution_id: Uuid) -> Result<StageExecution, PipelineError> {
        let execution = self.runs.get_execution(execution_id)?;
        match execution.status {
            ExecutionStatus::Completed => Ok(execution),
            ExecutionStatus::WaitingApproval => match self.gate.evaluate(execution_id)? {
                GateResult::Satisfied => {
                    if let Some(output_id) = execution.output_artifact_id {
                        self.artifacts
                            .set_status(output_id, ArtifactStatus::Approved, None)?;
                    }
                    self.runs.mark_completed(execution_id, None)
                }
                // Pending: tolerate early polls. Rejected: the orchestrator
                // owns failing the run.
                GateResult::Pending | GateResult::Rejected => Ok(execution),
            },
            status => Err(PipelineError::invalid_state(
                "stage execution",
                execution_id,
                format!("cannot advance from {status}"),
            )),
        }
    }

    /// Fails a `WaitingApproval` execution whose gate was rejected,
    /// marking the output artifact rejected as well.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the execution is already terminal.
    pub fn reject(
        &self,
        execution_id: Uuid,
        comment: Option<String>,
    ) -> Result<StageExecution, PipelineError> {
        let execution = self.runs.get_execution(execution_id)?;
        if let Some(output_id) = execution.output_artifact_id {
            self.artifacts
                .set_status(output_id, ArtifactStatus::Rejected, comment)?;
        }
        self.runs.mark_failed(execution_id, "approval gate rejected")
    }

    fn record_failure(
        &self,
        execution_id: Uuid,
        reason: &str,
    ) -> Result<StageExecution, PipelineError> {
        self.runs.mark_failed(execution_id, reason)
    }
}
