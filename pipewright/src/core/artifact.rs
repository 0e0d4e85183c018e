//! Artifact records and their kind/status enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// The kind of work product an artifact holds.
///
/// Kinds form a total order matching the delivery sequence; each pipeline
/// stage consumes one kind and produces its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The source requirements document the pipeline starts from.
    SourceDoc,
    /// Domain entities extracted from the source document.
    DomainModel,
    /// API actions generated from the domain model.
    ApiSpec,
    /// Interface definition source generated from the API spec.
    InterfaceSpec,
    /// Validation schema generated from the interface spec.
    ValidationSchema,
    /// Storage DDL generated from the validation schema.
    StorageSchema,
}

impl ArtifactKind {
    /// All kinds in delivery order.
    pub const ORDERED: [Self; 6] = [
        Self::SourceDoc,
        Self::DomainModel,
        Self::ApiSpec,
        Self::InterfaceSpec,
        Self::ValidationSchema,
        Self::StorageSchema,
    ];

    /// Returns the zero-based position of this kind in the delivery order.
    #[must_use]
    pub fn position(self) -> usize {
        match self {
            Self::SourceDoc => 0,
            Self::DomainModel => 1,
            Self::ApiSpec => 2,
            Self::InterfaceSpec => 3,
            Self::ValidationSchema => 4,
            Self::StorageSchema => 5,
        }
    }

    /// Returns the kind produced by the stage that consumes this kind,
    /// or `None` for the last kind in the sequence.
    #[must_use]
    pub fn successor(self) -> Option<Self> {
        Self::ORDERED.get(self.position() + 1).copied()
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceDoc => write!(f, "source_doc"),
            Self::DomainModel => write!(f, "domain_model"),
            Self::ApiSpec => write!(f, "api_spec"),
            Self::InterfaceSpec => write!(f, "interface_spec"),
            Self::ValidationSchema => write!(f, "validation_schema"),
            Self::StorageSchema => write!(f, "storage_schema"),
        }
    }
}

/// The review status of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// Freshly produced, no gate opened.
    Draft,
    /// A gate is open and awaiting stakeholder decisions.
    PendingApproval,
    /// The gate was satisfied.
    Approved,
    /// At least one stakeholder rejected.
    Rejected,
}

impl ArtifactStatus {
    /// Returns true if the status can never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::PendingApproval => write!(f, "pending_approval"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A versioned unit of work product.
///
/// Artifacts are append-only: content is never mutated once persisted, and a
/// superseding result is always a new child artifact. The `parent_id`
/// back-reference forms the lineage tree; `version` is monotonic along each
/// lineage chain (root = 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique identifier.
    pub id: Uuid,
    /// The kind of work product.
    pub kind: ArtifactKind,
    /// Opaque structured payload. Validated only by stage processors.
    pub content: serde_json::Value,
    /// Position in the lineage chain, starting at 1 for roots.
    pub version: u32,
    /// Current review status.
    pub status: ArtifactStatus,
    /// Parent artifact in the lineage, if any.
    pub parent_id: Option<Uuid>,
    /// Who (or which stage execution) produced this artifact.
    pub created_by: String,
    /// Hex-encoded SHA-256 digest of the content payload.
    pub content_digest: String,
    /// Reviewer comment recorded with a terminal status, if any.
    pub status_comment: Option<String>,
    /// When the artifact was persisted.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    /// Computes the hex-encoded SHA-256 digest of a content payload.
    #[must_use]
    pub fn digest_of(content: &serde_json::Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns true if this artifact is a lineage root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
