//! Pipeline plans: the ordered, validated stage definition list.

use crate::core::{ArtifactKind, StageDefinition};
use crate::errors::{PipelineError, ValidationError};
use crate::processor::builtin;
use serde::{Deserialize, Serialize};

/// An ordered list of stage definitions forming one pipeline.
///
/// Construction validates the static invariants once: gap-free order
/// indices, each stage consuming what its predecessor produces, and each
/// stage producing the successor kind of what it consumes. The orchestrator
/// never re-derives stage order from anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinePlan {
    stages: Vec<StageDefinition>,
}

impl PipelinePlan {
    /// Builds a validated plan from stage definitions in any order.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if order indices have gaps or duplicates, if a
    /// stage's consumed kind does not match its predecessor's produced
    /// kind, if a stage's produced kind is not the successor of its
    /// consumed kind, or if a stage's quorum exceeds its stakeholder panel.
    pub fn new(mut stages: Vec<StageDefinition>) -> Result<Self, PipelineError> {
        stages.sort_by_key(|s| s.order_index);

        for (expected, stage) in stages.iter().enumerate() {
            if stage.order_index != expected {
                return Err(ValidationError::new(format!(
                    "stage order indices must be gap-free: expected {expected}, found {}",
                    stage.order_index
                ))
                .into());
            }
            if let Some(consumes) = stage.consumes {
                if consumes.successor() != Some(stage.produces) {
                    return Err(ValidationError::new(format!(
                        "stage {expected} produces {} which does not succeed {consumes}",
                        stage.produces
                    ))
                    .into());
                }
            }
            if expected > 0 {
                let previous = &stages[expected - 1];
                if stage.consumes != Some(previous.produces) {
                    return Err(ValidationError::new(format!(
                        "stage {expected} consumes {:?} but stage {} produces {}",
                        stage.consumes,
                        expected - 1,
                        previous.produces
                    ))
                    .into());
                }
            }
            if stage.required_approvals > stage.stakeholders.len() {
                return Err(ValidationError::new(format!(
                    "stage {expected} requires {} approvals from a panel of {}",
                    stage.required_approvals,
                    stage.stakeholders.len()
                ))
                .into());
            }
        }

        Ok(Self { stages })
    }

    /// Builds the standard five-stage delivery plan over the built-in
    /// processors, with no approval gates. Add quorums with
    /// [`Self::with_stage_quorum`].
    ///
    /// # Errors
    ///
    /// Never fails in practice; the standard chain satisfies every plan
    /// invariant.
    pub fn standard() -> Result<Self, PipelineError> {
        use ArtifactKind::{
            ApiSpec, DomainModel, InterfaceSpec, SourceDoc, StorageSchema, ValidationSchema,
        };
        Self::new(vec![
            StageDefinition::new(0, Some(SourceDoc), DomainModel, builtin::DOC_PROCESSOR),
            StageDefinition::new(1, Some(DomainModel), ApiSpec, builtin::API_GENERATOR),
            StageDefinition::new(2, Some(ApiSpec), InterfaceSpec, builtin::INTERFACE_GENERATOR),
            StageDefinition::new(
                3,
                Some(InterfaceSpec),
                ValidationSchema,
                builtin::VALIDATION_SCHEMA_GENERATOR,
            ),
            StageDefinition::new(
                4,
                Some(ValidationSchema),
                StorageSchema,
                builtin::STORAGE_SCHEMA_GENERATOR,
            ),
        ])
    }

    /// Returns a copy of the plan with a quorum set on one stage.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the stage index does not exist or the quorum
    /// exceeds the stakeholder panel, so an unsatisfiable gate is caught
    /// here instead of mid-run.
    pub fn with_stage_quorum(
        mut self,
        order_index: usize,
        required: usize,
        stakeholders: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, PipelineError> {
        let stage = self.stages.get_mut(order_index).ok_or_else(|| {
            ValidationError::new(format!("no stage with order index {order_index}"))
        })?;
        let updated = stage.clone().with_quorum(required, stakeholders);
        if updated.required_approvals > updated.stakeholders.len() {
            return Err(ValidationError::new(format!(
                "stage {order_index} requires {required} approvals from a panel of {}",
                updated.stakeholders.len()
            ))
            .into());
        }
        *stage = updated;
        Ok(self)
    }

    /// The stages in order.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Returns the stage at the given order index.
    #[must_use]
    pub fn get(&self, order_index: usize) -> Option<&StageDefinition> {
        self.stages.get(order_index)
    }

    /// The number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true for an empty plan.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The processor keys referenced by the plan, in stage order.
    pub fn processor_keys(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.processor_key.as_str())
    }

    /// The artifact kind a run of this plan is seeded with.
    #[must_use]
    pub fn seed_kind(&self) -> ArtifactKind {
        self.stages
            .first()
            .and_then(|s| s.consumes)
            .unwrap_or(ArtifactKind::SourceDoc)
    }
}
