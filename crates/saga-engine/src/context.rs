//! Per-run saga context.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};

use crate::error::SharedError;
use crate::result::SagaStepResult;
use crate::status::SagaStatus;
use crate::types::SagaId;

/// A typed key into the compensation-data store.
///
/// A step that needs to hand data from `execute` to its own `compensate`
/// declares a key constant and uses it on both sides:
///
/// ```
/// use saga_engine::CompensationKey;
///
/// const PREVIOUS_STATUS: CompensationKey<String> = CompensationKey::new("previous_status");
/// ```
///
/// Each step owns its own key namespace. A lookup under the wrong value type
/// returns `None` instead of failing at runtime.
pub struct CompensationKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CompensationKey<T> {
    /// Creates a key with the given name.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Returns the key name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Mutable, run-scoped bag of identity, status and bookkeeping for one saga
/// execution.
///
/// Saga-specific input, loaded and computed fields live in the embedded
/// `state`; the engine never inspects it. A context is created immediately
/// before a run, fully mutated during the single `execute` call, and handed
/// back inside the [`SagaResult`](crate::SagaResult).
pub struct SagaContext<S> {
    saga_id: SagaId,
    saga_type: String,
    executor_id: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    status: SagaStatus,
    step_results: HashMap<String, SagaStepResult>,
    compensation_data: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
    failure_reason: Option<String>,
    failure_error: Option<SharedError>,

    /// Saga-specific state, owned by the concrete saga.
    pub state: S,
}

impl<S> SagaContext<S> {
    /// Creates a context for a new run of the given saga type.
    pub fn new(saga_type: impl Into<String>, state: S) -> Self {
        Self {
            saga_id: SagaId::new(),
            saga_type: saga_type.into(),
            executor_id: None,
            started_at: Utc::now(),
            completed_at: None,
            status: SagaStatus::Started,
            step_results: HashMap::new(),
            compensation_data: HashMap::new(),
            failure_reason: None,
            failure_error: None,
            state,
        }
    }

    /// Creates a context attributed to the given executing actor.
    pub fn with_executor(
        saga_type: impl Into<String>,
        executor_id: impl Into<String>,
        state: S,
    ) -> Self {
        Self {
            executor_id: Some(executor_id.into()),
            ..Self::new(saga_type, state)
        }
    }

    /// Returns the run ID, assigned at construction.
    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    /// Returns the saga type identifier.
    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    /// Returns the executing actor, if one was attributed.
    pub fn executor_id(&self) -> Option<&str> {
        self.executor_id.as_deref()
    }

    /// Returns when the run started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the run reached a terminal status, if it has.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the current status.
    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Returns the failure reason, if the run failed.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns the failure error, if the run failed with one.
    pub fn failure_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.failure_error.as_deref()
    }

    /// Records the latest result for a step; overwrites any earlier attempt.
    pub fn record_step_result(&mut self, step_name: impl Into<String>, result: SagaStepResult) {
        self.step_results.insert(step_name.into(), result);
    }

    /// Returns the last recorded result for a step, if it was attempted.
    pub fn step_result(&self, step_name: &str) -> Option<&SagaStepResult> {
        self.step_results.get(step_name)
    }

    /// Returns the number of steps that were actually attempted.
    pub fn attempted_steps(&self) -> usize {
        self.step_results.len()
    }

    /// Stores a value a step will need during its own compensation.
    pub fn put_compensation<T: Send + Sync + 'static>(
        &mut self,
        key: &CompensationKey<T>,
        value: T,
    ) {
        self.compensation_data.insert(key.name, Box::new(value));
    }

    /// Reads back a previously stored compensation value.
    ///
    /// Returns `None` if nothing was stored under the key, or if the stored
    /// value has a different type than the key.
    pub fn compensation<T: Send + Sync + 'static>(&self, key: &CompensationKey<T>) -> Option<&T> {
        self.compensation_data
            .get(key.name)
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Removes and returns a previously stored compensation value.
    ///
    /// A type mismatch leaves the stored value in place and returns `None`.
    pub fn take_compensation<T: Send + Sync + 'static>(
        &mut self,
        key: &CompensationKey<T>,
    ) -> Option<T> {
        match self.compensation_data.remove(key.name) {
            Some(value) => match value.downcast::<T>() {
                Ok(boxed) => Some(*boxed),
                Err(value) => {
                    self.compensation_data.insert(key.name, value);
                    None
                }
            },
            None => None,
        }
    }

    /// Transitions to `Completed` and stamps the terminal timestamp.
    pub fn complete(&mut self) {
        self.status = SagaStatus::Completed;
        self.finish();
    }

    /// Transitions to `Failed` with the given reason, stamping the terminal
    /// timestamp. Reserved for engine-level anomalies.
    pub fn fail(&mut self, reason: impl Into<String>, error: Option<SharedError>) {
        self.status = SagaStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.failure_error = error;
        self.finish();
    }

    /// Transitions to `Compensating`; the terminal timestamp is not touched.
    pub fn start_compensation(&mut self) {
        self.status = SagaStatus::Compensating;
    }

    /// Transitions to `Compensated` and stamps the terminal timestamp.
    pub fn mark_compensated(&mut self) {
        self.status = SagaStatus::Compensated;
        self.finish();
    }

    // The terminal timestamp is written exactly once.
    fn finish(&mut self) {
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for SagaContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaContext")
            .field("saga_id", &self.saga_id)
            .field("saga_type", &self.saga_type)
            .field("executor_id", &self.executor_id)
            .field("status", &self.status)
            .field("attempted_steps", &self.step_results.len())
            .field("failure_reason", &self.failure_reason)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
