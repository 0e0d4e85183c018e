//! Record stores: artifacts, runs, and stage executions.
//!
//! These are the only shared mutable state in the system. Each store owns
//! its records behind a lock and performs invariant checks and writes
//! atomically, the in-memory equivalent of row-level conditional writes.

mod artifacts;
mod runs;

pub use artifacts::ArtifactStore;
pub use runs::RunStore;
