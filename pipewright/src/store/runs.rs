//! Run and stage-execution record storage.

use crate::core::{ExecutionStatus, PipelineRun, RunStatus, StageExecution};
use crate::errors::{InvalidTransitionError, NotFoundError, PipelineError};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Store of pipeline run and stage execution records.
///
/// All mutations happen under the write lock, so a write that would violate
/// the at-most-one-non-terminal-execution invariant fails atomically instead
/// of overwriting. Terminal statuses are immutable once recorded.
#[derive(Debug, Default)]
pub struct RunStore {
    runs: RwLock<HashMap<Uuid, PipelineRun>>,
    executions: RwLock<HashMap<Uuid, StageExecution>>,
}

impl RunStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and persists a new running pipeline run.
    pub fn create_run(&self, initial_artifact_id: Uuid) -> PipelineRun {
        let run = PipelineRun::new(initial_artifact_id);
        tracing::info!(run_id = %run.id, initial_artifact_id = %initial_artifact_id, "Pipeline run started");
        self.runs.write().insert(run.id, run.clone());
        run
    }

    /// Fetches a run by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get_run(&self, id: Uuid) -> Result<PipelineRun, PipelineError> {
        self.runs
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| NotFoundError::new("run", id).into())
    }

    /// Marks a run completed with its final artifact.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the run is already terminal.
    pub fn complete_run(
        &self,
        id: Uuid,
        final_artifact_id: Uuid,
    ) -> Result<PipelineRun, PipelineError> {
        let mut runs = self.runs.write();
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| NotFoundError::new("run", id))?;
        if run.status.is_terminal() {
            return Err(InvalidTransitionError::new(
                "run",
                id,
                run.status.to_string(),
                RunStatus::Completed.to_string(),
            )
            .into());
        }
        run.status = RunStatus::Completed;
        run.final_artifact_id = Some(final_artifact_id);
        run.ended_at = Some(crate::utils::now());
        tracing::info!(run_id = %id, final_artifact_id = %final_artifact_id, "Pipeline run completed");
        Ok(run.clone())
    }

    /// Marks a run failed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the run is already terminal.
    pub fn fail_run(&self, id: Uuid, reason: impl Into<String>) -> Result<PipelineRun, PipelineError> {
        let mut runs = self.runs.write();
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| NotFoundError::new("run", id))?;
        if run.status.is_terminal() {
            return Err(InvalidTransitionError::new(
                "run",
                id,
                run.status.to_string(),
                RunStatus::Failed.to_string(),
            )
            .into());
        }
        let reason = reason.into();
        run.status = RunStatus::Failed;
        run.failure_reason = Some(reason.clone());
        run.ended_at = Some(crate::utils::now());
        tracing::warn!(run_id = %id, reason = %reason, "Pipeline run failed");
        Ok(run.clone())
    }

    /// Inserts a new running stage execution.
    ///
    /// Enforces at most one non-terminal attempt per (run, stage) pair: the
    /// check and the insert happen under the same write lock.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if another non-terminal attempt exists for
    /// this run and stage, and `NotFound` if the run does not exist.
    pub fn create_execution(
        &self,
        run_id: Uuid,
        stage_index: usize,
        input_artifact_id: Uuid,
    ) -> Result<StageExecution, PipelineError> {
        if !self.runs.read().contains_key(&run_id) {
            return Err(NotFoundError::new("run", run_id).into());
        }

        let mut executions = self.executions.write();
        if let Some(open) = executions.values().find(|e| {
            e.run_id == run_id && e.stage_index == stage_index && !e.status.is_terminal()
        }) {
            return Err(PipelineError::invalid_state(
                "stage execution",
                open.id,
                format!("stage {stage_index} already has a non-terminal attempt"),
            ));
        }

        let execution = StageExecution::new(run_id, stage_index, input_artifact_id);
        tracing::info!(
            execution_id = %execution.id,
            run_id = %run_id,
            stage_index,
            "Stage execution started"
        );
        executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    /// Fetches a stage execution by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get_execution(&self, id: Uuid) -> Result<StageExecution, PipelineError> {
        self.executions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| NotFoundError::new("stage execution", id).into())
    }

    /// Moves a running execution to `WaitingApproval` with its output.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the execution is `Running`.
    pub fn mark_waiting_approval(
        &self,
        id: Uuid,
        output_artifact_id: Uuid,
    ) -> Result<StageExecution, PipelineError> {
        self.transition(id, ExecutionStatus::WaitingApproval, |e| {
            e.output_artifact_id = Some(output_artifact_id);
        })
    }

    /// Moves an execution to `Completed`.
    ///
    /// For ungated stages this also records the output; gated stages have
    /// already recorded it when entering `WaitingApproval`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the execution is already terminal.
    pub fn mark_completed(
        &self,
        id: Uuid,
        output_artifact_id: Option<Uuid>,
    ) -> Result<StageExecution, PipelineError> {
        self.transition(id, ExecutionStatus::Completed, |e| {
            if output_artifact_id.is_some() {
                e.output_artifact_id = output_artifact_id;
            }
            e.ended_at = Some(crate::utils::now());
        })
    }

    /// Moves an execution to `Failed`, appending the reason to its log.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the execution is already terminal.
    pub fn mark_failed(
        &self,
        id: Uuid,
        reason: impl Into<String>,
    ) -> Result<StageExecution, PipelineError> {
        let reason = reason.into();
        self.transition(id, ExecutionStatus::Failed, |e| {
            e.log.push(reason.clone());
            e.ended_at = Some(crate::utils::now());
        })
    }

    /// Appends a log entry to an execution.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn append_log(&self, id: Uuid, entry: impl Into<String>) -> Result<(), PipelineError> {
        let mut executions = self.executions.write();
        let execution = executions
            .get_mut(&id)
            .ok_or_else(|| NotFoundError::new("stage execution", id))?;
        execution.log.push(entry.into());
        Ok(())
    }

    /// Returns all executions for a run, ordered by stage index then start
    /// time. This ordering is the run's audit trail; the orchestrator
    /// derives "next stage to run" from it rather than keeping a counter.
    #[must_use]
    pub fn executions_for_run(&self, run_id: Uuid) -> Vec<StageExecution> {
        let mut executions: Vec<StageExecution> = self
            .executions
            .read()
            .values()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect();
        executions.sort_by_key(|e| (e.stage_index, e.started_at));
        executions
    }

    fn transition(
        &self,
        id: Uuid,
        to: ExecutionStatus,
        apply: impl FnOnce(&mut StageExecution),
    ) -> Result<StageExecution, PipelineError> {
        let mut executions = self.executions.write();
        let execution = executions
            .get_mut(&id)
            .ok_or_else(|| NotFoundError::new("stage execution", id))?;

        let allowed = match to {
            ExecutionStatus::WaitingApproval => execution.status == ExecutionStatus::Running,
            ExecutionStatus::Completed | ExecutionStatus::Failed => {
                !execution.status.is_terminal()
            }
            ExecutionStatus::Running => false,
        };
        if !allowed {
            return Err(InvalidTransitionError::new(
                "stage execution",
                id,
                execution.status.to_string(),
                to.to_string(),
            )
            .into());
        }

        execution.status = to;
        apply(execution);
        tracing::info!(execution_id = %id, status = %to, "Stage execution transitioned");
        Ok(execution.clone())
    }
}
