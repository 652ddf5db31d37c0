//! In-process saga orchestration for multi-aggregate business operations.
//!
//! A saga runs a named sequence of business steps as one logical, non-ACID
//! transaction: forward execution in registration order, bounded retry per
//! step, and backward recovery (compensation) of previously successful steps
//! when a mandatory step fails. Optional steps may fail without aborting the
//! run, and a per-step execution predicate lets steps opt out of a run
//! entirely.
//!
//! A caller builds a [`SagaContext`] with its saga-specific state, registers
//! [`SagaStep`] implementations on a [`SagaOrchestrator`] in business order,
//! awaits `execute`, and branches on the returned [`SagaResult`].
//!
//! The engine is deliberately not a distributed-transaction protocol and not
//! a durable workflow engine: in-flight state lives in the context for one
//! run only, and compensation is a semantic rollback performed by the steps
//! themselves.

pub mod context;
pub mod error;
pub mod events;
pub mod execution_log;
pub mod orchestrator;
pub mod result;
pub mod status;
pub mod step;
pub mod types;

pub use context::{CompensationKey, SagaContext};
pub use error::{SagaError, SharedError};
pub use events::{
    ChannelEventPublisher, NoopEventPublisher, SagaEvent, SagaEventPublisher,
    TracingEventPublisher, EVENT_SAGA_COMPENSATED, EVENT_SAGA_COMPLETED, EVENT_SAGA_FAILED,
};
pub use execution_log::{ExecutionLogSink, MemoryLogSink, SagaExecutionLog, TracingLogSink};
pub use orchestrator::SagaOrchestrator;
pub use result::{SagaResult, SagaStepResult};
pub use status::{SagaStatus, StepStatus};
pub use step::{SagaStep, SagaStepExt, When};
pub use types::SagaId;
