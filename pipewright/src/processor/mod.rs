//! Stage processor capability and typed registry.

pub mod builtin;

use crate::errors::PipelineError;
use dashmap::DashMap;
use std::sync::Arc;

/// A transformation from one artifact payload to the next.
///
/// Processors are pure with respect to the pipeline: they must not persist
/// anything themselves — the stage executor is the sole writer of artifacts.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait StageProcessor: Send + Sync {
    /// The registry key this processor is dispatched under.
    fn key(&self) -> &str;

    /// Transforms an input payload into the next stage's payload.
    ///
    /// # Errors
    ///
    /// Returns `Processing` on malformed input.
    async fn process(&self, input: &serde_json::Value) -> Result<serde_json::Value, PipelineError>;
}

/// Registry mapping processor keys to implementations.
///
/// Resolution of a missing key is a configuration error; the orchestrator
/// resolves every key in a plan before the first stage runs, so an
/// `UnknownProcessor` never surfaces mid-run.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: DashMap<String, Arc<dyn StageProcessor>>,
}

impl ProcessorRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-loaded with the built-in processors.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for processor in builtin::all() {
            registry.register(processor);
        }
        registry
    }

    /// Registers a processor under its own key, replacing any previous
    /// registration for that key.
    pub fn register(&self, processor: Arc<dyn StageProcessor>) {
        self.processors
            .insert(processor.key().to_string(), processor);
    }

    /// Resolves a processor by key.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProcessor` if no processor is registered for the key.
    pub fn resolve(&self, key: &str) -> Result<Arc<dyn StageProcessor>, PipelineError> {
        self.processors
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PipelineError::unknown_processor(key))
    }

    /// Resolves every key up front, failing fast on the first miss.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProcessor` for the first unregistered key.
    pub fn resolve_all<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), PipelineError> {
        for key in keys {
            self.resolve(key)?;
        }
        Ok(())
    }

    /// Returns true if a processor is registered under the key.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.processors.contains_key(key)
    }

    /// Lists the registered keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.processors.iter().map(|e| e.key().clone()).collect()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
