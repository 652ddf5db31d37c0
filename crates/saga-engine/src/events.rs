//! Saga lifecycle notifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

use crate::context::SagaContext;
use crate::status::SagaStatus;
use crate::types::SagaId;

/// Event type for a successfully completed saga.
pub const EVENT_SAGA_COMPLETED: &str = "saga_completed";
/// Event type for a saga rolled back after a mandatory step failure.
pub const EVENT_SAGA_COMPENSATED: &str = "saga_compensated";
/// Event type for a saga aborted by an engine-level anomaly.
pub const EVENT_SAGA_FAILED: &str = "saga_failed";

/// A serializable saga-level lifecycle notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaEvent {
    /// The saga run the event belongs to.
    pub saga_id: SagaId,
    /// The saga type identifier.
    pub saga_type: String,
    /// The event type, one of the `EVENT_*` constants or a custom type.
    pub event_type: String,
    /// Saga status at the time the event was emitted.
    pub status: SagaStatus,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Optional ad-hoc payload for custom events.
    pub payload: Option<JsonValue>,
}

impl SagaEvent {
    /// Creates an event from the current context.
    pub fn from_context<S>(ctx: &SagaContext<S>, event_type: impl Into<String>) -> Self {
        Self {
            saga_id: ctx.saga_id(),
            saga_type: ctx.saga_type().to_string(),
            event_type: event_type.into(),
            status: ctx.status(),
            timestamp: Utc::now(),
            payload: None,
        }
    }

    /// Attaches an ad-hoc payload.
    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Pluggable seam for saga-level lifecycle notifications.
///
/// The orchestrator calls exactly one of the three terminal methods once per
/// run. `saga_event` is available to steps and facades for ad-hoc
/// checkpoints; the core algorithm does not call it.
#[async_trait]
pub trait SagaEventPublisher<S: Send + Sync>: Send + Sync {
    /// The saga finished with all mandatory steps successful.
    async fn saga_completed(&self, ctx: &SagaContext<S>);

    /// The saga failed and rollback of prior successful steps finished.
    async fn saga_compensated(&self, ctx: &SagaContext<S>);

    /// The engine aborted the saga outside the normal step contract.
    async fn saga_failed(&self, ctx: &SagaContext<S>);

    /// An ad-hoc checkpoint notification.
    async fn saga_event(&self, event_type: &str, ctx: &SagaContext<S>, payload: JsonValue);
}

/// Default publisher: discards all notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl<S: Send + Sync> SagaEventPublisher<S> for NoopEventPublisher {
    async fn saga_completed(&self, _ctx: &SagaContext<S>) {}

    async fn saga_compensated(&self, _ctx: &SagaContext<S>) {}

    async fn saga_failed(&self, _ctx: &SagaContext<S>) {}

    async fn saga_event(&self, _event_type: &str, _ctx: &SagaContext<S>, _payload: JsonValue) {}
}

/// Publisher that forwards notifications to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventPublisher;

#[async_trait]
impl<S: Send + Sync> SagaEventPublisher<S> for TracingEventPublisher {
    async fn saga_completed(&self, ctx: &SagaContext<S>) {
        tracing::info!(saga_id = %ctx.saga_id(), saga_type = %ctx.saga_type(), "saga completed");
    }

    async fn saga_compensated(&self, ctx: &SagaContext<S>) {
        tracing::warn!(
            saga_id = %ctx.saga_id(),
            saga_type = %ctx.saga_type(),
            reason = ctx.failure_reason(),
            "saga compensated"
        );
    }

    async fn saga_failed(&self, ctx: &SagaContext<S>) {
        tracing::error!(
            saga_id = %ctx.saga_id(),
            saga_type = %ctx.saga_type(),
            reason = ctx.failure_reason(),
            "saga failed"
        );
    }

    async fn saga_event(&self, event_type: &str, ctx: &SagaContext<S>, payload: JsonValue) {
        tracing::info!(
            saga_id = %ctx.saga_id(),
            saga_type = %ctx.saga_type(),
            event_type,
            %payload,
            "saga event"
        );
    }
}

/// Publisher that forwards [`SagaEvent`]s over an unbounded channel, e.g. to
/// a message-bus bridge or a notification fan-out task.
///
/// Send failures (receiver dropped) are ignored; event publication is
/// fire-and-forget and never influences the saga outcome.
#[derive(Debug, Clone)]
pub struct ChannelEventPublisher {
    tx: mpsc::UnboundedSender<SagaEvent>,
}

impl ChannelEventPublisher {
    /// Creates a publisher sending into the given channel.
    pub fn new(tx: mpsc::UnboundedSender<SagaEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: SagaEvent) {
        let _ = self.tx.send(event);
    }
}

#[async_trait]
impl<S: Send + Sync> SagaEventPublisher<S> for ChannelEventPublisher {
    async fn saga_completed(&self, ctx: &SagaContext<S>) {
        self.send(SagaEvent::from_context(ctx, EVENT_SAGA_COMPLETED));
    }

    async fn saga_compensated(&self, ctx: &SagaContext<S>) {
        self.send(SagaEvent::from_context(ctx, EVENT_SAGA_COMPENSATED));
    }

    async fn saga_failed(&self, ctx: &SagaContext<S>) {
        self.send(SagaEvent::from_context(ctx, EVENT_SAGA_FAILED));
    }

    async fn saga_event(&self, event_type: &str, ctx: &SagaContext<S>, payload: JsonValue) {
        self.send(SagaEvent::from_context(ctx, event_type).with_payload(payload));
    }
}
