//! # Pipewright
//!
//! An approval-gated artifact delivery pipeline.
//!
//! Pipewright turns a source document into a chain of derived artifacts
//! (domain model, API spec, interface spec, validation schema, storage
//! schema), with support for:
//!
//! - **Versioned lineage**: every artifact records its parent, forming an
//!   unbroken chain back to the source document
//! - **Approval gates**: stages can require a stakeholder quorum before the
//!   run proceeds, with a single rejection acting as a veto
//! - **Derived control flow**: the next stage to run is computed from stored
//!   execution records, never from a cursor
//! - **Scheduler-friendly steps**: every orchestration entry point is a
//!   short-lived call that returns what to do next
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipewright::prelude::*;
//!
//! let plan = PipelinePlan::standard()?.with_stage_quorum(0, 2, ["alice", "bob"])?;
//! let orchestrator = PipelineOrchestrator::in_memory(plan);
//!
//! let step = orchestrator
//!     .start_run(serde_json::json!({"title": "Tracker", "body": "..."}), "pm")
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod core;
pub mod errors;
pub mod executor;
pub mod gate;
pub mod orchestrator;
pub mod processor;
pub mod store;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        ApprovalRequest, Artifact, ArtifactKind, ArtifactStatus, DecisionOutcome, DecisionStatus,
        ExecutionStatus, GateResult, PipelineRun, RunStatus, StageDefinition, StageExecution,
    };
    pub use crate::errors::PipelineError;
    pub use crate::executor::StageExecutor;
    pub use crate::gate::ApprovalGate;
    pub use crate::orchestrator::{
        DecisionRecord, PipelineOrchestrator, PipelinePlan, RunReport, StepResult, StepStatus,
    };
    pub use crate::processor::{ProcessorRegistry, StageProcessor};
    pub use crate::store::{ArtifactStore, RunStore};
    pub use crate::utils::generate_uuid;
}
