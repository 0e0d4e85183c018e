//! Error types for the pipewright pipeline.
//!
//! Every fallible operation surfaces one of these variants to its immediate
//! caller, carrying enough context (entity id, attempted transition) to log
//! and alert on. Nothing is swallowed.

use thiserror::Error;
use uuid::Uuid;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed lineage or type mismatch, rejected before any write.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A status transition from a terminal state was attempted.
    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransitionError),

    /// A stage definition references a processor key that is not registered.
    #[error("No processor registered for key '{key}'")]
    UnknownProcessor {
        /// The missing processor key.
        key: String,
    },

    /// An external stage processor failed on its input.
    #[error("Processor '{key}' failed: {reason}")]
    Processing {
        /// The processor key that failed.
        key: String,
        /// The failure description.
        reason: String,
    },

    /// A decision was submitted for a request that is no longer pending.
    #[error("{0}")]
    AlreadyDecided(#[from] AlreadyDecidedError),

    /// A referenced entity does not exist.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// An operation was attempted against an entity in the wrong state.
    #[error("Invalid state for {entity} {id}: {reason}")]
    InvalidState {
        /// The entity kind ("run", "stage execution", "gate").
        entity: &'static str,
        /// The entity identifier.
        id: Uuid,
        /// Why the operation is not allowed.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Creates an unknown-processor error.
    #[must_use]
    pub fn unknown_processor(key: impl Into<String>) -> Self {
        Self::UnknownProcessor { key: key.into() }
    }

    /// Creates a processing error for the given processor key.
    #[must_use]
    pub fn processing(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Processing {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid-state error.
    #[must_use]
    pub fn invalid_state(entity: &'static str, id: Uuid, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            entity,
            id,
            reason: reason.into(),
        }
    }
}

/// Error raised when a write would violate a data-model invariant.
#[derive(Debug, Clone, Error)]
#[error("Validation failed: {message}")]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// The entity the write targeted, if known.
    pub entity_id: Option<Uuid>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            entity_id: None,
        }
    }

    /// Attaches the offending entity id.
    #[must_use]
    pub fn with_entity(mut self, id: Uuid) -> Self {
        self.entity_id = Some(id);
        self
    }
}

/// Error raised when mutating a status that is already terminal.
#[derive(Debug, Clone, Error)]
#[error("Invalid transition for {entity} {id}: {from} is terminal, cannot move to {to}")]
pub struct InvalidTransitionError {
    /// The entity kind.
    pub entity: &'static str,
    /// The entity identifier.
    pub id: Uuid,
    /// The current (terminal) status.
    pub from: String,
    /// The attempted status.
    pub to: String,
}

impl InvalidTransitionError {
    /// Creates a new invalid-transition error.
    #[must_use]
    pub fn new(
        entity: &'static str,
        id: Uuid,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            entity,
            id,
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Error raised when a second decision is submitted for a request.
///
/// The first decision wins; the stored outcome is reported so racing
/// callers can detect what they lost to.
#[derive(Debug, Clone, Error)]
#[error("Approval request {request_id} already decided: {outcome}")]
pub struct AlreadyDecidedError {
    /// The request identifier.
    pub request_id: Uuid,
    /// The outcome that stands.
    pub outcome: String,
}

impl AlreadyDecidedError {
    /// Creates a new already-decided error.
    #[must_use]
    pub fn new(request_id: Uuid, outcome: impl Into<String>) -> Self {
        Self {
            request_id,
            outcome: outcome.into(),
        }
    }
}

/// Error raised when a referenced entity does not exist.
#[derive(Debug, Clone, Error)]
#[error("{entity} not found: {id}")]
pub struct NotFoundError {
    /// The entity kind.
    pub entity: &'static str,
    /// The missing identifier.
    pub id: Uuid,
}

impl NotFoundError {
    /// Creates a new not-found error.
    #[must_use]
    pub fn new(entity: &'static str, id: Uuid) -> Self {
        Self { entity, id }
    }
}
