//! End-to-end orchestration tests over the in-memory stores.

use super::{PipelineOrchestrator, PipelinePlan, StepStatus};
use crate::core::{
    ArtifactKind, ArtifactStatus, DecisionOutcome, DecisionStatus, ExecutionStatus, GateResult,
    RunStatus, StageDefinition,
};
use crate::errors::PipelineError;
use crate::gate::ApprovalGate;
use crate::processor::{MockStageProcessor, ProcessorRegistry};
use crate::store::{ArtifactStore, RunStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn source_doc() -> serde_json::Value {
    json!({
        "title": "Task tracker",
        "body": "User has id, email, display name. Task has id, title, status."
    })
}

fn orchestrator(plan: PipelinePlan) -> PipelineOrchestrator {
    init_tracing();
    PipelineOrchestrator::in_memory(plan)
}

fn mock_processor(
    key: &str,
    behavior: impl Fn(&serde_json::Value) -> Result<serde_json::Value, PipelineError>
        + Send
        + Sync
        + 'static,
) -> Arc<MockStageProcessor> {
    let mut mock = MockStageProcessor::new();
    mock.expect_key().return_const(key.to_string());
    mock.expect_process().returning(move |input| behavior(input));
    Arc::new(mock)
}

/// Two-stage plan over mock processors, for tests that need controllable
/// stage behavior.
fn two_stage_orchestrator(
    first: Arc<MockStageProcessor>,
    second: Arc<MockStageProcessor>,
) -> PipelineOrchestrator {
    init_tracing();
    let registry = ProcessorRegistry::new();
    registry.register(first);
    registry.register(second);

    let plan = PipelinePlan::new(vec![
        StageDefinition::new(
            0,
            Some(ArtifactKind::SourceDoc),
            ArtifactKind::DomainModel,
            "first",
        ),
        StageDefinition::new(
            1,
            Some(ArtifactKind::DomainModel),
            ArtifactKind::ApiSpec,
            "second",
        ),
    ])
    .unwrap();

    PipelineOrchestrator::new(
        plan,
        Arc::new(ArtifactStore::new()),
        Arc::new(RunStore::new()),
        Arc::new(ApprovalGate::new()),
        Arc::new(registry),
    )
}

#[tokio::test]
async fn test_ungated_run_completes_all_stages_in_order() {
    let orch = orchestrator(PipelinePlan::standard().unwrap());

    let step = orch.start_run(source_doc(), "tester").await.unwrap();
    assert_eq!(step.status, StepStatus::RunCompleted);

    let run = orch.runs().get_run(step.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let executions = orch.runs().executions_for_run(step.run_id);
    assert_eq!(executions.len(), 5);
    for (i, exec) in executions.iter().enumerate() {
        assert_eq!(exec.stage_index, i);
        assert_eq!(exec.status, ExecutionStatus::Completed);
    }

    // The final artifact sits at the end of an unbroken lineage from the seed.
    let final_artifact = orch.artifacts().get(step.artifact_id.unwrap()).unwrap();
    assert_eq!(final_artifact.kind, ArtifactKind::StorageSchema);
    let lineage = orch.artifacts().lineage(final_artifact.id).unwrap();
    assert_eq!(lineage.len(), 6);
    assert_eq!(lineage[0].id, run.initial_artifact_id);
    for (i, artifact) in lineage.iter().enumerate() {
        assert_eq!(artifact.version, u32::try_from(i).unwrap() + 1);
    }
}

#[tokio::test]
async fn test_gated_run_suspends_then_completes_on_approval() {
    let plan = PipelinePlan::standard()
        .unwrap()
        .with_stage_quorum(1, 1, ["alice"])
        .unwrap();
    let orch = orchestrator(plan);

    let step = orch.start_run(source_doc(), "tester").await.unwrap();
    assert_eq!(step.status, StepStatus::WaitingApproval);

    let exec_id = step.stage_execution_id.unwrap();
    let pending = orch.artifacts().get(step.artifact_id.unwrap()).unwrap();
    assert_eq!(pending.status, ArtifactStatus::PendingApproval);

    // Only stages before the gate have run.
    assert_eq!(orch.runs().executions_for_run(step.run_id).len(), 2);

    let request = orch.gate().requests_for(exec_id)[0].clone();
    let record = orch
        .on_approval_decision(request.id, DecisionOutcome::Approved, Some("lgtm".into()))
        .await
        .unwrap();

    assert_eq!(record.gate, GateResult::Satisfied);
    let resumed = record.step.unwrap();
    assert_eq!(resumed.status, StepStatus::RunCompleted);

    let approved = orch.artifacts().get(pending.id).unwrap();
    assert_eq!(approved.status, ArtifactStatus::Approved);
    assert_eq!(orch.runs().executions_for_run(step.run_id).len(), 5);
}

#[tokio::test]
async fn test_single_rejection_vetoes_and_fails_run() {
    let plan = PipelinePlan::standard()
        .unwrap()
        .with_stage_quorum(0, 2, ["alice", "bob", "carol"])
        .unwrap();
    let orch = orchestrator(plan);

    let step = orch.start_run(source_doc(), "tester").await.unwrap();
    let exec_id = step.stage_execution_id.unwrap();
    let requests = orch.gate().requests_for(exec_id);

    orch.on_approval_decision(requests[0].id, DecisionOutcome::Approved, None)
        .await
        .unwrap();
    let record = orch
        .on_approval_decision(
            requests[1].id,
            DecisionOutcome::Rejected,
            Some("model is wrong".into()),
        )
        .await
        .unwrap();

    assert_eq!(record.gate, GateResult::Rejected);
    assert_eq!(record.step.unwrap().status, StepStatus::Failed);

    let run = orch.runs().get_run(step.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    let artifact = orch.artifacts().get(step.artifact_id.unwrap()).unwrap();
    assert_eq!(artifact.status, ArtifactStatus::Rejected);
    assert_eq!(artifact.status_comment.as_deref(), Some("model is wrong"));

    // A later approval cannot un-reject: it is recorded, nothing more.
    let late = orch
        .on_approval_decision(requests[2].id, DecisionOutcome::Approved, None)
        .await
        .unwrap();
    assert_eq!(late.gate, GateResult::Rejected);
    assert!(late.step.is_none());
    assert_eq!(
        orch.runs().get_run(step.run_id).unwrap().status,
        RunStatus::Failed
    );
}

#[tokio::test]
async fn test_late_veto_after_satisfied_gate_is_recorded_only() {
    let plan = PipelinePlan::standard()
        .unwrap()
        .with_stage_quorum(0, 1, ["alice", "bob"])
        .unwrap()
        .with_stage_quorum(1, 1, ["carol"])
        .unwrap();
    let orch = orchestrator(plan);

    let step = orch.start_run(source_doc(), "tester").await.unwrap();
    let stage0_exec = step.stage_execution_id.unwrap();
    let stage0_artifact = step.artifact_id.unwrap();

    // Alice alone satisfies stage 0; the run advances to stage 1's gate.
    let requests = orch.gate().requests_for(stage0_exec);
    let record = orch
        .on_approval_decision(requests[0].id, DecisionOutcome::Approved, None)
        .await
        .unwrap();
    let waiting = record.step.unwrap();
    assert_eq!(waiting.status, StepStatus::WaitingApproval);
    assert_ne!(waiting.stage_execution_id, Some(stage0_exec));

    // Bob's veto lands after stage 0 already completed: it is recorded, but
    // cannot un-complete the stage or fail the run.
    let late = orch
        .on_approval_decision(
            requests[1].id,
            DecisionOutcome::Rejected,
            Some("too late".into()),
        )
        .await
        .unwrap();
    assert_eq!(late.gate, GateResult::Rejected);
    assert!(late.step.is_none());
    assert_eq!(
        orch.runs().get_run(step.run_id).unwrap().status,
        RunStatus::Running
    );
    assert_eq!(
        orch.artifacts().get(stage0_artifact).unwrap().status,
        ArtifactStatus::Approved
    );

    // The run still finishes through stage 1's gate.
    let carol = orch.gate().requests_for(waiting.stage_execution_id.unwrap())[0].clone();
    let finished = orch
        .on_approval_decision(carol.id, DecisionOutcome::Approved, None)
        .await
        .unwrap();
    assert_eq!(finished.step.unwrap().status, StepStatus::RunCompleted);
}

#[tokio::test]
async fn test_duplicate_decision_is_rejected() {
    let plan = PipelinePlan::standard()
        .unwrap()
        .with_stage_quorum(0, 2, ["alice", "bob"])
        .unwrap();
    let orch = orchestrator(plan);

    let step = orch.start_run(source_doc(), "tester").await.unwrap();
    let requests = orch.gate().requests_for(step.stage_execution_id.unwrap());

    orch.on_approval_decision(requests[0].id, DecisionOutcome::Approved, None)
        .await
        .unwrap();
    let err = orch
        .on_approval_decision(requests[0].id, DecisionOutcome::Rejected, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyDecided(_)));

    // The standing decision survives the duplicate attempt.
    let stored = orch.gate().get_request(requests[0].id).unwrap();
    assert_eq!(stored.status, DecisionStatus::Approved);
}

#[tokio::test]
async fn test_processor_failure_fails_run_without_later_stages() {
    let first = mock_processor("first", |_| Ok(json!({"entities": []})));
    let second = mock_processor("second", |_| {
        Err(PipelineError::processing("second", "no entities to expand"))
    });
    let orch = two_stage_orchestrator(first, second);

    let step = orch.start_run(source_doc(), "tester").await.unwrap();
    assert_eq!(step.status, StepStatus::Failed);

    let run = orch.runs().get_run(step.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .failure_reason
        .as_deref()
        .is_some_and(|r| r.contains("no entities to expand")));

    let executions = orch.runs().executions_for_run(step.run_id);
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].status, ExecutionStatus::Completed);
    assert_eq!(executions[1].status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn test_retry_seeds_new_run_and_skips_covered_stages() {
    let first = mock_processor("first", |_| Ok(json!({"entities": []})));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let second = mock_processor("second", move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(PipelineError::processing("second", "transient"))
        } else {
            Ok(json!({"actions": []}))
        }
    });
    let orch = two_stage_orchestrator(first, second);

    let failed = orch.start_run(source_doc(), "tester").await.unwrap();
    assert_eq!(failed.status, StepStatus::Failed);

    // Seed the retry from the last completed output of the failed run.
    let seed_id = orch.runs().executions_for_run(failed.run_id)[0]
        .output_artifact_id
        .unwrap();
    let retried = orch.start_run_from(seed_id).await.unwrap();

    assert_eq!(retried.status, StepStatus::RunCompleted);
    assert_ne!(retried.run_id, failed.run_id);
    // Stage 0 was skipped: its product is already covered by the seed.
    let executions = orch.runs().executions_for_run(retried.run_id);
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].stage_index, 1);
    assert_eq!(executions[0].input_artifact_id, seed_id);

    // The failed run's records are untouched.
    assert_eq!(
        orch.runs().get_run(failed.run_id).unwrap().status,
        RunStatus::Failed
    );
}

#[tokio::test]
async fn test_empty_plan_completes_with_seed_artifact() {
    let orch = orchestrator(PipelinePlan::new(Vec::new()).unwrap());

    let step = orch.start_run(source_doc(), "tester").await.unwrap();
    assert_eq!(step.status, StepStatus::RunCompleted);

    let run = orch.runs().get_run(step.run_id).unwrap();
    assert_eq!(run.final_artifact_id, Some(run.initial_artifact_id));
    assert!(orch.runs().executions_for_run(step.run_id).is_empty());
}

#[tokio::test]
async fn test_runs_are_independent() {
    let plan = PipelinePlan::standard()
        .unwrap()
        .with_stage_quorum(0, 1, ["alice"])
        .unwrap();
    let orch = orchestrator(plan);

    let a = orch.start_run(source_doc(), "tester").await.unwrap();
    let b = orch.start_run(source_doc(), "tester").await.unwrap();
    assert_ne!(a.run_id, b.run_id);

    // Approving run A's gate leaves run B suspended.
    let request = orch.gate().requests_for(a.stage_execution_id.unwrap())[0].clone();
    let record = orch
        .on_approval_decision(request.id, DecisionOutcome::Approved, None)
        .await
        .unwrap();
    assert_eq!(record.step.unwrap().status, StepStatus::RunCompleted);

    assert_eq!(
        orch.runs().get_run(b.run_id).unwrap().status,
        RunStatus::Running
    );
    assert_eq!(
        orch.poll(b.run_id).await.unwrap().status,
        StepStatus::WaitingApproval
    );
}

#[tokio::test]
async fn test_poll_resumes_after_out_of_band_decisions() {
    let plan = PipelinePlan::standard()
        .unwrap()
        .with_stage_quorum(2, 1, ["alice"])
        .unwrap();
    let orch = orchestrator(plan);

    let step = orch.start_run(source_doc(), "tester").await.unwrap();
    assert_eq!(step.status, StepStatus::WaitingApproval);

    // Decide directly on the gate, then let the scheduler's poll pick it up.
    let request = orch.gate().requests_for(step.stage_execution_id.unwrap())[0].clone();
    orch.gate()
        .decide(request.id, DecisionOutcome::Approved, None)
        .unwrap();

    let polled = orch.poll(step.run_id).await.unwrap();
    assert_eq!(polled.status, StepStatus::RunCompleted);

    // Polling a terminal run keeps returning the terminal result.
    let again = orch.poll(step.run_id).await.unwrap();
    assert_eq!(again.status, StepStatus::RunCompleted);
    assert_eq!(again.artifact_id, polled.artifact_id);
}

#[tokio::test]
async fn test_externally_failed_run_stops_orchestration() {
    let plan = PipelinePlan::standard()
        .unwrap()
        .with_stage_quorum(0, 1, ["alice"])
        .unwrap();
    let orch = orchestrator(plan);

    let step = orch.start_run(source_doc(), "tester").await.unwrap();
    orch.fail_run(step.run_id, "cancelled by operator").unwrap();

    // A decision arriving after the cancel is recorded but drives nothing.
    let request = orch.gate().requests_for(step.stage_execution_id.unwrap())[0].clone();
    let record = orch
        .on_approval_decision(request.id, DecisionOutcome::Approved, None)
        .await
        .unwrap();
    assert_eq!(record.gate, GateResult::Satisfied);
    assert!(record.step.is_none());

    let polled = orch.poll(step.run_id).await.unwrap();
    assert_eq!(polled.status, StepStatus::Failed);
}

#[tokio::test]
async fn test_unknown_processor_fails_before_any_write() {
    init_tracing();
    let plan = PipelinePlan::standard().unwrap();
    let orch = PipelineOrchestrator::new(
        plan,
        Arc::new(ArtifactStore::new()),
        Arc::new(RunStore::new()),
        Arc::new(ApprovalGate::new()),
        Arc::new(ProcessorRegistry::new()),
    );

    let err = orch.start_run(source_doc(), "tester").await.unwrap_err();
    assert!(matches!(err, PipelineError::UnknownProcessor { .. }));
    assert!(orch.artifacts().is_empty());
}

#[tokio::test]
async fn test_run_report_collects_executions_and_approvals() {
    let plan = PipelinePlan::standard()
        .unwrap()
        .with_stage_quorum(1, 2, ["alice", "bob"])
        .unwrap();
    let orch = orchestrator(plan);

    let step = orch.start_run(source_doc(), "tester").await.unwrap();
    let request = orch.gate().requests_for(step.stage_execution_id.unwrap())[0].clone();
    orch.on_approval_decision(request.id, DecisionOutcome::Approved, None)
        .await
        .unwrap();

    let report = orch.run_report(step.run_id).unwrap();
    assert_eq!(report.run.status, RunStatus::Running);
    assert_eq!(report.executions.len(), 2);
    assert_eq!(report.approvals.len(), 2);
    assert_eq!(
        report
            .approvals
            .iter()
            .filter(|r| r.status == DecisionStatus::Approved)
            .count(),
        1
    );
}
