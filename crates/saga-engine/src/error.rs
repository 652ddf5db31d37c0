//! Engine error types.

use std::sync::Arc;

use thiserror::Error;

/// A shareable, type-erased error carried on failure results and contexts.
///
/// Steps surface failures as values rather than propagating them, so the
/// original error has to survive cloning into results, contexts and events.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the engine itself, outside the normal step contract.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Two registered steps share a name, which would corrupt the
    /// per-step result registry.
    #[error("duplicate step name '{0}' registered")]
    DuplicateStep(String),

    /// A step reported failure after exhausting its retry budget.
    #[error("step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// A compensation attempt failed; the rollback loop continues past it.
    #[error("compensation for step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// A step panicked; the panic was caught at the engine boundary and
    /// converted into a failure result.
    #[error("step '{0}' panicked")]
    StepPanicked(String),
}
