//! Step contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::context::SagaContext;
use crate::result::SagaStepResult;

/// One unit of business work inside a saga, with its compensating action.
///
/// Implementations own their forward logic (`execute`), their rollback logic
/// (`compensate`) and their configuration; the provided defaults give a
/// mandatory step with no retries, a one second retry delay and an
/// unconditional execution predicate.
///
/// `compensate` is only ever invoked for a step whose `execute` returned
/// success. Retries re-invoke `execute` only, so implementations must stay
/// idempotent across attempts (e.g. re-read fresh entity state each attempt
/// to survive optimistic-lock conflicts).
#[async_trait]
pub trait SagaStep<S: Send + Sync>: Send + Sync {
    /// The step name, unique within one saga definition.
    fn name(&self) -> &str;

    /// Whether a failure of this step aborts the saga and triggers
    /// compensation of all prior successful steps.
    fn is_mandatory(&self) -> bool {
        true
    }

    /// Number of retries after a failed execution attempt.
    fn max_retries(&self) -> u32 {
        0
    }

    /// Delay between execution attempts.
    fn retry_delay(&self) -> Duration {
        Duration::from_millis(1000)
    }

    /// Whether this step participates in the current run.
    ///
    /// Evaluated once per forward pass, before any retry attempts. A step
    /// skipped here is never executed and never compensated.
    fn should_execute(&self, _ctx: &SagaContext<S>) -> bool {
        true
    }

    /// Performs the forward work, mutating the context and storing any
    /// compensation data it will need later.
    async fn execute(&self, ctx: &mut SagaContext<S>) -> SagaStepResult;

    /// Undoes the effect of a previously successful `execute`.
    async fn compensate(&self, _ctx: &mut SagaContext<S>) -> SagaStepResult {
        SagaStepResult::success()
    }
}

/// Wraps a step with an execution predicate, leaving the rest of its
/// configuration untouched. Built via [`SagaStepExt::when`].
pub struct When<T, P> {
    inner: T,
    predicate: P,
}

#[async_trait]
impl<S, T, P> SagaStep<S> for When<T, P>
where
    S: Send + Sync,
    T: SagaStep<S>,
    P: Fn(&SagaContext<S>) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_mandatory(&self) -> bool {
        self.inner.is_mandatory()
    }

    fn max_retries(&self) -> u32 {
        self.inner.max_retries()
    }

    fn retry_delay(&self) -> Duration {
        self.inner.retry_delay()
    }

    fn should_execute(&self, ctx: &SagaContext<S>) -> bool {
        (self.predicate)(ctx)
    }

    async fn execute(&self, ctx: &mut SagaContext<S>) -> SagaStepResult {
        self.inner.execute(ctx).await
    }

    async fn compensate(&self, ctx: &mut SagaContext<S>) -> SagaStepResult {
        self.inner.compensate(ctx).await
    }
}

/// Combinators available on every step.
pub trait SagaStepExt<S: Send + Sync>: SagaStep<S> + Sized {
    /// Overrides the execution predicate, e.g. to make a step conditional
    /// on context state:
    ///
    /// ```ignore
    /// orchestrator.add_step(GrantGuildExp::new(guilds).when(|ctx| ctx.state.guild_mission))
    /// ```
    fn when<P>(self, predicate: P) -> When<Self, P>
    where
        P: Fn(&SagaContext<S>) -> bool + Send + Sync,
    {
        When {
            inner: self,
            predicate,
        }
    }
}

impl<S: Send + Sync, T: SagaStep<S>> SagaStepExt<S> for T {}
