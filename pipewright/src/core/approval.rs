//! Approval requests and gate evaluation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The status of one stakeholder's sign-off request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Awaiting the stakeholder's decision.
    Pending,
    /// The stakeholder approved.
    Approved,
    /// The stakeholder rejected.
    Rejected,
}

impl DecisionStatus {
    /// Returns true once a decision has been recorded. Decisions are final.
    #[must_use]
    pub fn is_decided(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A stakeholder's decision outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// Sign off on the artifact.
    Approved,
    /// Veto the artifact.
    Rejected,
}

impl From<DecisionOutcome> for DecisionStatus {
    fn from(outcome: DecisionOutcome) -> Self {
        match outcome {
            DecisionOutcome::Approved => Self::Approved,
            DecisionOutcome::Rejected => Self::Rejected,
        }
    }
}

/// One stakeholder's pending or decided sign-off for a stage execution.
///
/// The request set for an execution is fixed when the gate opens; it never
/// grows afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique identifier.
    pub id: Uuid,
    /// The stage execution this request gates.
    pub stage_execution_id: Uuid,
    /// The stakeholder asked to decide.
    pub stakeholder: String,
    /// Current decision state.
    pub status: DecisionStatus,
    /// Optional reviewer comment recorded with the decision.
    pub comment: Option<String>,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// When the decision was recorded.
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    /// Creates a new pending request.
    #[must_use]
    pub fn new(stage_execution_id: Uuid, stakeholder: impl Into<String>) -> Self {
        Self {
            id: crate::utils::generate_uuid(),
            stage_execution_id,
            stakeholder: stakeholder.into(),
            status: DecisionStatus::Pending,
            comment: None,
            created_at: crate::utils::now(),
            decided_at: None,
        }
    }
}

/// The derived state of an approval gate.
///
/// Always computed from the current request set, never stored, so it cannot
/// drift from the underlying decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateResult {
    /// Quorum not yet reached and no rejection recorded.
    Pending,
    /// Quorum reached with zero rejections.
    Satisfied,
    /// At least one stakeholder rejected. Unreachable from here on.
    Rejected,
}

impl fmt::Display for GateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Satisfied => write!(f, "satisfied"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_is_pending() {
        let req = ApprovalRequest::new(Uuid::new_v4(), "alice");
        assert_eq!(req.status, DecisionStatus::Pending);
        assert!(!req.status.is_decided());
        assert!(req.decided_at.is_none());
    }

    #[test]
    fn test_outcome_conversion() {
        assert_eq!(
            DecisionStatus::from(DecisionOutcome::Approved),
            DecisionStatus::Approved
        );
        assert_eq!(
            DecisionStatus::from(DecisionOutcome::Rejected),
            DecisionStatus::Rejected
        );
    }

    #[test]
    fn test_gate_result_display() {
        assert_eq!(GateResult::Pending.to_string(), "pending");
        assert_eq!(GateResult::Satisfied.to_string(), "satisfied");
        assert_eq!(GateResult::Rejected.to_string(), "rejected");
    }
}
