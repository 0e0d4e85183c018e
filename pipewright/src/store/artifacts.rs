//! Durable, versioned artifact storage.

use crate::core::{Artifact, ArtifactKind, ArtifactStatus};
use crate::errors::{InvalidTransitionError, NotFoundError, PipelineError, ValidationError};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Append-only store of artifact records.
///
/// Lineage is held as parent back-references only; child and chain lookups
/// are derived queries. Writes validate lineage typing before anything is
/// inserted, so a failed create leaves no trace.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    records: RwLock<HashMap<Uuid, Artifact>>,
}

impl ArtifactStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persists a new artifact.
    ///
    /// A parented artifact must have the kind that succeeds its parent's
    /// kind in the delivery order; its version continues the parent's chain.
    /// Parent references may only point to already-persisted artifacts,
    /// which rules out cycles by construction.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the parent does not exist and `Validation` if
    /// the kind does not succeed the parent's kind.
    pub fn create(
        &self,
        kind: ArtifactKind,
        content: serde_json::Value,
        parent_id: Option<Uuid>,
        created_by: impl Into<String>,
    ) -> Result<Artifact, PipelineError> {
        let mut records = self.records.write();

        let version = match parent_id {
            None => 1,
            Some(pid) => {
                let parent = records
                    .get(&pid)
                    .ok_or_else(|| NotFoundError::new("artifact", pid))?;
                if parent.kind.successor() != Some(kind) {
                    return Err(ValidationError::new(format!(
                        "artifact kind {kind} does not succeed parent kind {}",
                        parent.kind
                    ))
                    .with_entity(pid)
                    .into());
                }
                parent.version + 1
            }
        };

        let now = crate::utils::now();
        let artifact = Artifact {
            id: crate::utils::generate_uuid(),
            kind,
            content_digest: Artifact::digest_of(&content),
            content,
            version,
            status: ArtifactStatus::Draft,
            parent_id,
            created_by: created_by.into(),
            status_comment: None,
            created_at: now,
            updated_at: now,
        };

        tracing::debug!(
            artifact_id = %artifact.id,
            kind = %artifact.kind,
            version = artifact.version,
            parent_id = ?artifact.parent_id,
            "Artifact created"
        );

        records.insert(artifact.id, artifact.clone());
        Ok(artifact)
    }

    /// Fetches an artifact by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get(&self, id: Uuid) -> Result<Artifact, PipelineError> {
        self.records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| NotFoundError::new("artifact", id).into())
    }

    /// Moves an artifact to a new review status.
    ///
    /// Approvals are one-shot: once an artifact is `Approved` or `Rejected`
    /// its status never changes again.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the current status is terminal and
    /// `NotFound` for an unknown id.
    pub fn set_status(
        &self,
        id: Uuid,
        status: ArtifactStatus,
        comment: Option<String>,
    ) -> Result<Artifact, PipelineError> {
        let mut records = self.records.write();
        let artifact = records
            .get_mut(&id)
            .ok_or_else(|| NotFoundError::new("artifact", id))?;

        if artifact.status.is_terminal() {
            return Err(InvalidTransitionError::new(
                "artifact",
                id,
                artifact.status.to_string(),
                status.to_string(),
            )
            .into());
        }

        artifact.status = status;
        if comment.is_some() {
            artifact.status_comment = comment;
        }
        artifact.updated_at = crate::utils::now();

        tracing::debug!(artifact_id = %id, status = %status, "Artifact status changed");
        Ok(artifact.clone())
    }

    /// Returns the direct children of an artifact, derived from parent
    /// back-references.
    #[must_use]
    pub fn children(&self, id: Uuid) -> Vec<Artifact> {
        let mut children: Vec<Artifact> = self
            .records
            .read()
            .values()
            .filter(|a| a.parent_id == Some(id))
            .cloned()
            .collect();
        children.sort_by_key(|a| a.created_at);
        children
    }

    /// Returns the lineage chain from the root down to the given artifact.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the artifact or any ancestor is missing.
    pub fn lineage(&self, id: Uuid) -> Result<Vec<Artifact>, PipelineError> {
        let records = self.records.read();
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let artifact = records
                .get(&current)
                .ok_or_else(|| NotFoundError::new("artifact", current))?;
            cursor = artifact.parent_id;
            chain.push(artifact.clone());
        }
        chain.reverse();
        Ok(chain)
    }

    /// Returns the number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no artifacts are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
