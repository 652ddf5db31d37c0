//! Immutable audit records for step lifecycle transitions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::SagaContext;
use crate::status::StepStatus;
use crate::types::SagaId;

/// One audit record, produced at each step lifecycle transition.
///
/// Records are write-only from the engine's point of view; they exist for
/// observability and are never read back by the orchestration algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaExecutionLog {
    /// The saga run this record belongs to.
    pub saga_id: SagaId,
    /// The saga type identifier.
    pub saga_type: String,
    /// The step that transitioned.
    pub step_name: String,
    /// The lifecycle transition.
    pub status: StepStatus,
    /// Optional human-readable message from the step result.
    pub message: Option<String>,
    /// When the transition was recorded.
    pub timestamp: DateTime<Utc>,
    /// Attempt duration, for completed/failed transitions.
    pub duration_ms: Option<u64>,
    /// Rendered error, for failed transitions.
    pub error: Option<String>,
}

impl SagaExecutionLog {
    /// Creates a record for the given transition.
    pub fn new<S>(ctx: &SagaContext<S>, step_name: impl Into<String>, status: StepStatus) -> Self {
        Self {
            saga_id: ctx.saga_id(),
            saga_type: ctx.saga_type().to_string(),
            step_name: step_name.into(),
            status,
            message: None,
            timestamp: Utc::now(),
            duration_ms: None,
            error: None,
        }
    }

    /// Attaches the step result message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches the attempt duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Attaches a rendered error.
    pub fn with_error(mut self, error: impl std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Sink for audit records.
///
/// The orchestrator hands every record to exactly one sink; implementations
/// decide whether to forward it to a log pipeline, persist it, or keep it in
/// memory for inspection.
pub trait ExecutionLogSink: Send + Sync {
    /// Accepts one audit record.
    fn record(&self, entry: SagaExecutionLog);
}

/// Default sink: forwards records to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl ExecutionLogSink for TracingLogSink {
    fn record(&self, entry: SagaExecutionLog) {
        match entry.status {
            StepStatus::Failed => tracing::warn!(
                saga_id = %entry.saga_id,
                saga_type = %entry.saga_type,
                step = %entry.step_name,
                status = %entry.status,
                duration_ms = entry.duration_ms,
                error = entry.error.as_deref(),
                "saga step transition"
            ),
            _ => tracing::info!(
                saga_id = %entry.saga_id,
                saga_type = %entry.saga_type,
                step = %entry.step_name,
                status = %entry.status,
                duration_ms = entry.duration_ms,
                "saga step transition"
            ),
        }
    }
}

/// In-memory sink for tests and audit capture.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSink {
    entries: Arc<Mutex<Vec<SagaExecutionLog>>>,
}

impl MemoryLogSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all recorded entries, in order.
    pub fn entries(&self) -> Vec<SagaExecutionLog> {
        self.entries.lock().unwrap().clone()
    }

    /// Returns the recorded `(step_name, status)` pairs, in order.
    pub fn transitions(&self) -> Vec<(String, StepStatus)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| (entry.step_name.clone(), entry.status))
            .collect()
    }
}

impl ExecutionLogSink for MemoryLogSink {
    fn record(&self, entry: SagaExecutionLog) {
        self.entries.lock().unwrap().push(entry);
    }
}
