//! Pipeline orchestrator: run lifecycle and approval-gated sequencing.

mod plan;

pub use plan::PipelinePlan;

#[cfg(test)]
mod integration_tests;

use crate::core::{
    ApprovalRequest, ArtifactKind, DecisionOutcome, ExecutionStatus, GateResult, PipelineRun,
    StageDefinition, StageExecution,
};
use crate::errors::PipelineError;
use crate::executor::StageExecutor;
use crate::gate::ApprovalGate;
use crate::processor::ProcessorRegistry;
use crate::store::{ArtifactStore, RunStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// The outcome of one orchestration step, consumed by the external
/// scheduler to decide what to enqueue next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Every stage completed; `artifact_id` is the final artifact.
    RunCompleted,
    /// A gate is open; re-enter via a decision or `poll`.
    WaitingApproval,
    /// The run failed; no further steps should be scheduled.
    Failed,
}

/// Small result record returned by every orchestration entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The owning run.
    pub run_id: Uuid,
    /// What the scheduler should do next.
    pub status: StepStatus,
    /// The final or gate-pending artifact, when one exists.
    pub artifact_id: Option<Uuid>,
    /// The stage execution the step ended on, when one exists.
    pub stage_execution_id: Option<Uuid>,
}

impl StepResult {
    fn run_completed(run_id: Uuid, artifact_id: Uuid) -> Self {
        Self {
            run_id,
            status: StepStatus::RunCompleted,
            artifact_id: Some(artifact_id),
            stage_execution_id: None,
        }
    }

    fn waiting(run_id: Uuid, execution: &StageExecution) -> Self {
        Self {
            run_id,
            status: StepStatus::WaitingApproval,
            artifact_id: execution.output_artifact_id,
            stage_execution_id: Some(execution.id),
        }
    }

    fn failed(run_id: Uuid, stage_execution_id: Option<Uuid>) -> Self {
        Self {
            run_id,
            status: StepStatus::Failed,
            artifact_id: None,
            stage_execution_id,
        }
    }
}

/// A recorded reviewer decision together with the orchestration it caused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// The decided request.
    pub request: ApprovalRequest,
    /// The gate state after the decision.
    pub gate: GateResult,
    /// Orchestration triggered by the decision, if the gate resolved.
    pub step: Option<StepResult>,
}

/// Operator-facing summary of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// The run record.
    pub run: PipelineRun,
    /// Its executions in stage order.
    pub executions: Vec<StageExecution>,
    /// All approval requests across those executions.
    pub approvals: Vec<ApprovalRequest>,
}

/// Drives pipeline runs through the plan's stages, suspending on open
/// approval gates.
///
/// The orchestrator holds no per-run state: "next stage to run" is derived
/// from the stored execution records every time, and every entry point is a
/// short-lived step suitable for an external task scheduler. Suspension is
/// just returning `WaitingApproval`; resumption comes from
/// [`Self::on_approval_decision`] or [`Self::poll`].
pub struct PipelineOrchestrator {
    plan: PipelinePlan,
    artifacts: Arc<ArtifactStore>,
    runs: Arc<RunStore>,
    gate: Arc<ApprovalGate>,
    registry: Arc<ProcessorRegistry>,
    executor: StageExecutor,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator over the shared stores.
    #[must_use]
    pub fn new(
        plan: PipelinePlan,
        artifacts: Arc<ArtifactStore>,
        runs: Arc<RunStore>,
        gate: Arc<ApprovalGate>,
        registry: Arc<ProcessorRegistry>,
    ) -> Self {
        let executor = StageExecutor::new(
            Arc::clone(&artifacts),
            Arc::clone(&runs),
            Arc::clone(&gate),
            Arc::clone(&registry),
        );
        Self {
            plan,
            artifacts,
            runs,
            gate,
            registry,
            executor,
        }
    }

    /// Creates an orchestrator with fresh in-memory stores and the built-in
    /// processors.
    #[must_use]
    pub fn in_memory(plan: PipelinePlan) -> Self {
        Self::new(
            plan,
            Arc::new(ArtifactStore::new()),
            Arc::new(RunStore::new()),
            Arc::new(ApprovalGate::new()),
            Arc::new(ProcessorRegistry::with_builtins()),
        )
    }

    /// The plan this orchestrator drives.
    #[must_use]
    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    /// The artifact store shared with the executor.
    #[must_use]
    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    /// The run/execution store shared with the executor.
    #[must_use]
    pub fn runs(&self) -> &Arc<RunStore> {
        &self.runs
    }

    /// The approval gate shared with the executor.
    #[must_use]
    pub fn gate(&self) -> &Arc<ApprovalGate> {
        &self.gate
    }

    /// Starts a new run seeded with the given content, persisted as a root
    /// artifact, and drives it until it completes, fails, or suspends on a
    /// gate. A run over an empty plan completes immediately with the seed
    /// as its final artifact.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProcessor` if any plan key is unregistered (checked
    /// before anything is written) and store errors otherwise.
    pub async fn start_run(
        &self,
        initial_content: serde_json::Value,
        created_by: impl Into<String>,
    ) -> Result<StepResult, PipelineError> {
        self.registry.resolve_all(self.plan.processor_keys())?;
        let seed = self
            .artifacts
            .create(self.plan.seed_kind(), initial_content, None, created_by)?;
        let run = self.runs.create_run(seed.id);
        self.resume(run.id).await
    }

    /// Starts a new run seeded from an existing artifact, typically the
    /// last completed output of a failed run. Stages whose product the
    /// seed already covers are skipped.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown seed artifact and
    /// `UnknownProcessor` for an unregistered plan key.
    pub async fn start_run_from(&self, seed_artifact_id: Uuid) -> Result<StepResult, PipelineError> {
        self.registry.resolve_all(self.plan.processor_keys())?;
        let seed = self.artifacts.get(seed_artifact_id)?;
        let run = self.runs.create_run(seed.id);
        self.resume(run.id).await
    }

    /// Records a stakeholder decision and performs whatever orchestration
    /// it unlocks: advancing and resuming on a satisfied gate, failing the
    /// run on a rejection. This is the only mutation path available to
    /// external reviewers.
    ///
    /// For a run that was already marked failed, or a veto arriving after
    /// the stage execution ended, the decision is recorded but triggers no
    /// orchestration.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyDecided` for a duplicate decision and `NotFound`
    /// for an unknown request.
    pub async fn on_approval_decision(
        &self,
        request_id: Uuid,
        outcome: DecisionOutcome,
        comment: Option<String>,
    ) -> Result<DecisionRecord, PipelineError> {
        let request = self.gate.decide(request_id, outcome, comment)?;
        let execution = self.runs.get_execution(request.stage_execution_id)?;
        let gate = self.gate.evaluate(execution.id)?;

        let run = self.runs.get_run(execution.run_id)?;
        if run.status.is_terminal() {
            tracing::warn!(
                run_id = %run.id,
                request_id = %request_id,
                "Decision recorded for a terminal run; no orchestration"
            );
            return Ok(DecisionRecord {
                request,
                gate,
                step: None,
            });
        }

        let step = match gate {
            GateResult::Satisfied => {
                self.executor.advance(execution.id)?;
                Some(self.resume(run.id).await?)
            }
            GateResult::Rejected if execution.status.is_terminal() => {
                // The gate already resolved and was acted on; a veto arriving
                // after the stage completed cannot un-complete it.
                tracing::warn!(
                    execution_id = %execution.id,
                    request_id = %request_id,
                    "Veto recorded after the stage execution ended; no orchestration"
                );
                None
            }
            GateResult::Rejected => Some(self.fail_rejected(&execution, &request)?),
            GateResult::Pending => None,
        };

        Ok(DecisionRecord {
            request,
            gate,
            step,
        })
    }

    /// Scheduler-driven re-check of a run: re-evaluates an open gate and
    /// resumes if it resolved, otherwise reports the current suspension.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown run.
    pub async fn poll(&self, run_id: Uuid) -> Result<StepResult, PipelineError> {
        let run = self.runs.get_run(run_id)?;
        if run.status.is_terminal() {
            return Ok(Self::terminal_result(&run));
        }

        let executions = self.runs.executions_for_run(run_id);
        let Some(open) = executions
            .iter()
            .find(|e| e.status == ExecutionStatus::WaitingApproval)
        else {
            return self.resume(run_id).await;
        };

        match self.gate.evaluate(open.id)? {
            GateResult::Satisfied => {
                self.executor.advance(open.id)?;
                self.resume(run_id).await
            }
            GateResult::Rejected => {
                let rejected = self
                    .gate
                    .requests_for(open.id)
                    .into_iter()
                    .find(|r| r.status == crate::core::DecisionStatus::Rejected);
                match rejected {
                    Some(request) => self.fail_rejected(open, &request),
                    None => Ok(StepResult::waiting(run_id, open)),
                }
            }
            GateResult::Pending => Ok(StepResult::waiting(run_id, open)),
        }
    }

    /// Externally marks a run failed. An in-flight stage execution is not
    /// interrupted, but its result will be discarded: no further
    /// orchestration happens for a failed run.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the run is already terminal.
    pub fn fail_run(
        &self,
        run_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<PipelineRun, PipelineError> {
        self.runs.fail_run(run_id, reason)
    }

    /// Builds an operator-facing summary of a run.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown run.
    pub fn run_report(&self, run_id: Uuid) -> Result<RunReport, PipelineError> {
        let run = self.runs.get_run(run_id)?;
        let executions = self.runs.executions_for_run(run_id);
        let approvals = executions
            .iter()
            .flat_map(|e| self.gate.requests_for(e.id))
            .collect();
        Ok(RunReport {
            run,
            executions,
            approvals,
        })
    }

    /// Drives a run forward until it completes, fails, or suspends.
    ///
    /// The next stage is derived from the stored execution records each
    /// iteration; stages execute strictly in order index, and none starts
    /// before its predecessor completed.
    async fn resume(&self, run_id: Uuid) -> Result<StepResult, PipelineError> {
        loop {
            let run = self.runs.get_run(run_id)?;
            if run.status.is_terminal() {
                return Ok(Self::terminal_result(&run));
            }

            let executions = self.runs.executions_for_run(run_id);
            if let Some(open) = executions
                .iter()
                .find(|e| e.status == ExecutionStatus::WaitingApproval)
            {
                return Ok(StepResult::waiting(run_id, open));
            }
            if let Some(failed) = executions
                .iter()
                .find(|e| e.status == ExecutionStatus::Failed)
            {
                let reason = failed
                    .log
                    .last()
                    .cloned()
                    .unwrap_or_else(|| format!("stage {} failed", failed.stage_index));
                self.runs.fail_run(run_id, reason)?;
                return Ok(StepResult::failed(run_id, Some(failed.id)));
            }

            let seed = self.artifacts.get(run.initial_artifact_id)?;
            let input_id = Self::latest_output(&executions).unwrap_or(seed.id);

            let Some(stage) = self.next_stage(seed.kind, &executions) else {
                self.runs.complete_run(run_id, input_id)?;
                return Ok(StepResult::run_completed(run_id, input_id));
            };

            let execution = self.executor.start(run_id, stage, input_id).await?;
            match execution.status {
                ExecutionStatus::Completed => {}
                ExecutionStatus::WaitingApproval => {
                    return Ok(StepResult::waiting(run_id, &execution));
                }
                ExecutionStatus::Failed | ExecutionStatus::Running => {
                    let reason = execution
                        .log
                        .last()
                        .cloned()
                        .unwrap_or_else(|| format!("stage {} failed", stage.order_index));
                    self.runs.fail_run(run_id, reason)?;
                    return Ok(StepResult::failed(run_id, Some(execution.id)));
                }
            }
        }
    }

    /// The first stage, in order, whose product the seed does not already
    /// cover and which has no completed execution yet.
    fn next_stage(
        &self,
        seed_kind: ArtifactKind,
        executions: &[StageExecution],
    ) -> Option<&StageDefinition> {
        self.plan.stages().iter().find(|stage| {
            stage.produces.position() > seed_kind.position()
                && !executions.iter().any(|e| {
                    e.stage_index == stage.order_index && e.status == ExecutionStatus::Completed
                })
        })
    }

    fn latest_output(executions: &[StageExecution]) -> Option<Uuid> {
        executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Completed)
            .max_by_key(|e| e.stage_index)
            .and_then(|e| e.output_artifact_id)
    }

    fn fail_rejected(
        &self,
        execution: &StageExecution,
        request: &ApprovalRequest,
    ) -> Result<StepResult, PipelineError> {
        self.executor
            .reject(execution.id, request.comment.clone())?;
        self.runs.fail_run(
            execution.run_id,
            format!(
                "stage {} rejected by {}",
                execution.stage_index, request.stakeholder
            ),
        )?;
        Ok(StepResult::failed(execution.run_id, Some(execution.id)))
    }

    fn terminal_result(run: &PipelineRun) -> StepResult {
        match run.final_artifact_id {
            Some(artifact_id) => StepResult::run_completed(run.id, artifact_id),
            None => StepResult::failed(run.id, None),
        }
    }
}
