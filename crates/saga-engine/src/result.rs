//! Step and saga outcome values.

use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::context::SagaContext;
use crate::error::SharedError;
use crate::status::SagaStatus;
use crate::types::SagaId;

/// Outcome of a single step execution or compensation attempt.
///
/// Built only via the factory constructors; steps return this value instead
/// of propagating errors past the step boundary.
#[derive(Debug, Clone)]
pub struct SagaStepResult {
    success: bool,
    message: Option<String>,
    error: Option<SharedError>,
    data: Option<JsonValue>,
}

impl SagaStepResult {
    /// A successful outcome with no message or payload.
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
            error: None,
            data: None,
        }
    }

    /// A successful outcome carrying a human-readable message.
    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success()
        }
    }

    /// A successful outcome carrying a message and an opaque data payload.
    pub fn success_with_data(message: impl Into<String>, data: JsonValue) -> Self {
        Self {
            message: Some(message.into()),
            data: Some(data),
            ..Self::success()
        }
    }

    /// A failed outcome with a message only.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            error: None,
            data: None,
        }
    }

    /// A failed outcome with a message and the underlying error.
    pub fn failure_with(
        message: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            error: Some(Arc::new(error)),
            data: None,
        }
    }

    /// A failed outcome built from an error; the message is the error's
    /// rendered form.
    pub fn from_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            success: false,
            message: Some(error.to_string()),
            error: Some(Arc::new(error)),
            data: None,
        }
    }

    /// Returns true if the attempt succeeded.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns true if the attempt failed.
    pub fn is_failure(&self) -> bool {
        !self.success
    }

    /// Returns the message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the underlying error, if any.
    pub fn error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.error.as_deref()
    }

    /// Returns a shareable handle to the underlying error, if any.
    pub fn shared_error(&self) -> Option<SharedError> {
        self.error.clone()
    }

    /// Returns the opaque data payload, if any.
    pub fn data(&self) -> Option<&JsonValue> {
        self.data.as_ref()
    }
}

/// Terminal outcome of a saga run, wrapping the finished context.
///
/// The orchestrator never returns `Err` and never panics past its boundary;
/// callers branch on [`SagaResult::is_success`] and, on failure, may check
/// [`SagaResult::is_compensated`] to learn whether already-applied side
/// effects were semantically rolled back.
#[derive(Debug)]
pub struct SagaResult<S> {
    success: bool,
    context: SagaContext<S>,
    message: Option<String>,
    error: Option<SharedError>,
}

impl<S> SagaResult<S> {
    pub(crate) fn completed(context: SagaContext<S>) -> Self {
        Self {
            success: true,
            context,
            message: None,
            error: None,
        }
    }

    pub(crate) fn failed(
        context: SagaContext<S>,
        message: Option<String>,
        error: Option<SharedError>,
    ) -> Self {
        Self {
            success: false,
            context,
            message,
            error,
        }
    }

    /// Returns true if all mandatory steps completed.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns true if the run failed and rollback of previously successful
    /// steps has finished.
    pub fn is_compensated(&self) -> bool {
        self.context.status() == SagaStatus::Compensated
    }

    /// Returns the saga run ID.
    pub fn saga_id(&self) -> SagaId {
        self.context.saga_id()
    }

    /// Returns the terminal status of the run.
    pub fn status(&self) -> SagaStatus {
        self.context.status()
    }

    /// Returns the failure message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the failure error, if any.
    pub fn error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.error.as_deref()
    }

    /// Returns the finished context.
    pub fn context(&self) -> &SagaContext<S> {
        &self.context
    }

    /// Consumes the result and returns the finished context.
    pub fn into_context(self) -> SagaContext<S> {
        self.context
    }
}
