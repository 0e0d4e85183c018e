//! Approval gate: sign-off requests and quorum evaluation.

use crate::core::{ApprovalRequest, DecisionOutcome, DecisionStatus, GateResult};
use crate::errors::{AlreadyDecidedError, NotFoundError, PipelineError, ValidationError};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// The stakeholder panel recorded when a gate opens. Fixed for the life of
/// the gate.
#[derive(Debug, Clone)]
struct GatePanel {
    required: usize,
    request_ids: Vec<Uuid>,
}

/// Tracks sign-off requests per stage execution and evaluates quorum.
///
/// Gate state is never cached: `evaluate` recomputes the result from the
/// current request set every time, so there is no stored flag to drift from
/// the underlying decisions.
#[derive(Debug, Default)]
pub struct ApprovalGate {
    requests: RwLock<HashMap<Uuid, ApprovalRequest>>,
    panels: RwLock<HashMap<Uuid, GatePanel>>,
}

impl ApprovalGate {
    /// Creates a new gate service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a gate for a stage execution, creating one pending request per
    /// stakeholder. The panel is fixed at this point and never grows.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the execution already has a gate, and
    /// `Validation` if the panel cannot satisfy the quorum (empty panel or
    /// quorum larger than the panel).
    pub fn open(
        &self,
        stage_execution_id: Uuid,
        stakeholders: &[String],
        required: usize,
    ) -> Result<Vec<ApprovalRequest>, PipelineError> {
        if required == 0 || stakeholders.is_empty() || required > stakeholders.len() {
            return Err(ValidationError::new(format!(
                "unsatisfiable gate: quorum {required} against a panel of {}",
                stakeholders.len()
            ))
            .with_entity(stage_execution_id)
            .into());
        }

        let mut panels = self.panels.write();
        if panels.contains_key(&stage_execution_id) {
            return Err(PipelineError::invalid_state(
                "gate",
                stage_execution_id,
                "gate already open for this stage execution",
            ));
        }

        let mut requests = self.requests.write();
        let created: Vec<ApprovalRequest> = stakeholders
            .iter()
            .map(|s| ApprovalRequest::new(stage_execution_id, s))
            .collect();
        for request in &created {
            requests.insert(request.id, request.clone());
        }
        panels.insert(
            stage_execution_id,
            GatePanel {
                required,
                request_ids: created.iter().map(|r| r.id).collect(),
            },
        );

        tracing::info!(
            execution_id = %stage_execution_id,
            required,
            panel_size = created.len(),
            "Approval gate opened"
        );
        Ok(created)
    }

    /// Records a stakeholder's decision. First decision wins; decisions are
    /// final.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyDecided` (carrying the standing outcome) if the
    /// request is no longer pending, so racing callers can detect the loss.
    pub fn decide(
        &self,
        request_id: Uuid,
        outcome: DecisionOutcome,
        comment: Option<String>,
    ) -> Result<ApprovalRequest, PipelineError> {
        let mut requests = self.requests.write();
        let request = requests
            .get_mut(&request_id)
            .ok_or_else(|| NotFoundError::new("approval request", request_id))?;

        if request.status.is_decided() {
            return Err(AlreadyDecidedError::new(request_id, request.status.to_string()).into());
        }

        request.status = DecisionStatus::from(outcome);
        request.comment = comment;
        request.decided_at = Some(crate::utils::now());

        tracing::info!(
            request_id = %request_id,
            execution_id = %request.stage_execution_id,
            stakeholder = %request.stakeholder,
            status = %request.status,
            "Approval decision recorded"
        );
        Ok(request.clone())
    }

    /// Evaluates the gate for a stage execution from its current request
    /// set: any rejection vetoes, otherwise the quorum count decides.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no gate was opened for the execution.
    pub fn evaluate(&self, stage_execution_id: Uuid) -> Result<GateResult, PipelineError> {
        let panels = self.panels.read();
        let panel = panels
            .get(&stage_execution_id)
            .ok_or_else(|| NotFoundError::new("gate", stage_execution_id))?;

        let requests = self.requests.read();
        let mut approved = 0;
        for id in &panel.request_ids {
            match requests.get(id).map(|r| r.status) {
                Some(DecisionStatus::Rejected) => return Ok(GateResult::Rejected),
                Some(DecisionStatus::Approved) => approved += 1,
                _ => {}
            }
        }

        if approved >= panel.required {
            Ok(GateResult::Satisfied)
        } else {
            Ok(GateResult::Pending)
        }
    }

    /// Fetches a request by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get_request(&self, request_id: Uuid) -> Result<ApprovalRequest, PipelineError> {
        self.requests
            .read()
            .get(&request_id)
            .cloned()
            .ok_or_else(|| NotFoundError::new("approval request", request_id).into())
    }

    /// Returns the requests in an execution's panel, in panel order.
    #[must_use]
    pub fn requests_for(&self, stage_execution_id: Uuid) -> Vec<ApprovalRequest> {
        let panels = self.panels.read();
        let Some(panel) = panels.get(&stage_execution_id) else {
            return Vec::new();
        };
        let requests = self.requests.read();
        panel
            .request_ids
            .iter()
            .filter_map(|id| requests.get(id).cloned())
            .collect()
    }

    /// Returns true if a gate has been opened for the execution.
    #[must_use]
    pub fn is_open(&self, stage_execution_id: Uuid) -> bool {
        self.panels.read().contains_key(&stage_execution_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_open_creates_pending_requests() {
        let gate = ApprovalGate::new();
        let exec = Uuid::new_v4();
        let requests = gate.open(exec, &panel(&["alice", "bob"]), 2).unwrap();

        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.status == DecisionStatus::Pending));
        assert_eq!(gate.evaluate(exec).unwrap(), GateResult::Pending);
    }

    #[test]
    fn test_open_rejects_duplicate_gate() {
        let gate = ApprovalGate::new();
        let exec = Uuid::new_v4();
        gate.open(exec, &panel(&["alice"]), 1).unwrap();

        let err = gate.open(exec, &panel(&["bob"]), 1).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState { .. }));
        // The original panel stands.
        assert_eq!(gate.requests_for(exec).len(), 1);
    }

    #[test]
    fn test_open_rejects_unsatisfiable_panel() {
        let gate = ApprovalGate::new();
        assert!(matches!(
            gate.open(Uuid::new_v4(), &[], 1).unwrap_err(),
            PipelineError::Validation(_)
        ));
        assert!(matches!(
            gate.open(Uuid::new_v4(), &panel(&["alice"]), 2).unwrap_err(),
            PipelineError::Validation(_)
        ));
    }

    #[test]
    fn test_quorum_satisfied() {
        let gate = ApprovalGate::new();
        let exec = Uuid::new_v4();
        let requests = gate.open(exec, &panel(&["alice", "bob"]), 2).unwrap();

        gate.decide(requests[0].id, DecisionOutcome::Approved, None)
            .unwrap();
        assert_eq!(gate.evaluate(exec).unwrap(), GateResult::Pending);

        gate.decide(requests[1].id, DecisionOutcome::Approved, Some("ship it".into()))
            .unwrap();
        assert_eq!(gate.evaluate(exec).unwrap(), GateResult::Satisfied);
    }

    #[test]
    fn test_single_rejection_vetoes() {
        let gate = ApprovalGate::new();
        let exec = Uuid::new_v4();
        let requests = gate.open(exec, &panel(&["alice", "bob"]), 1).unwrap();

        gate.decide(requests[0].id, DecisionOutcome::Approved, None)
            .unwrap();
        gate.decide(requests[1].id, DecisionOutcome::Rejected, Some("no".into()))
            .unwrap();

        // Quorum is reached, but the veto wins regardless.
        assert_eq!(gate.evaluate(exec).unwrap(), GateResult::Rejected);
    }

    #[test]
    fn test_first_decision_wins() {
        let gate = ApprovalGate::new();
        let exec = Uuid::new_v4();
        let requests = gate.open(exec, &panel(&["alice"]), 1).unwrap();

        gate.decide(requests[0].id, DecisionOutcome::Approved, None)
            .unwrap();
        let err = gate
            .decide(requests[0].id, DecisionOutcome::Rejected, None)
            .unwrap_err();

        match err {
            PipelineError::AlreadyDecided(e) => assert_eq!(e.outcome, "approved"),
            other => panic!("expected AlreadyDecided, got {other}"),
        }
        assert_eq!(
            gate.get_request(requests[0].id).unwrap().status,
            DecisionStatus::Approved
        );
    }

    #[test]
    fn test_evaluate_unknown_gate() {
        let gate = ApprovalGate::new();
        assert!(matches!(
            gate.evaluate(Uuid::new_v4()).unwrap_err(),
            PipelineError::NotFound(_)
        ));
    }
}
