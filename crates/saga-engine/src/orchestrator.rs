//! The saga orchestration engine.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;

use crate::context::SagaContext;
use crate::error::{SagaError, SharedError};
use crate::events::{NoopEventPublisher, SagaEventPublisher};
use crate::execution_log::{ExecutionLogSink, SagaExecutionLog, TracingLogSink};
use crate::result::{SagaResult, SagaStepResult};
use crate::status::StepStatus;
use crate::step::SagaStep;

/// Drives an ordered list of steps through the saga protocol: forward
/// execution with bounded retry, then backward recovery of previously
/// successful steps when a mandatory step fails.
///
/// Steps run strictly in registration order, one at a time, on the calling
/// task. `execute` consumes the context for one run and always returns a
/// [`SagaResult`]; it never returns an error and never panics past its
/// boundary.
pub struct SagaOrchestrator<S: Send + Sync> {
    steps: Vec<Box<dyn SagaStep<S>>>,
    publisher: Arc<dyn SagaEventPublisher<S>>,
    log_sink: Arc<dyn ExecutionLogSink>,
}

impl<S: Send + Sync + 'static> Default for SagaOrchestrator<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + Sync + 'static> SagaOrchestrator<S> {
    /// Creates an orchestrator with no steps, a no-op event publisher and
    /// the tracing log sink.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            publisher: Arc::new(NoopEventPublisher),
            log_sink: Arc::new(TracingLogSink),
        }
    }

    /// Replaces the event publisher.
    pub fn with_publisher(mut self, publisher: Arc<dyn SagaEventPublisher<S>>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Replaces the audit log sink.
    pub fn with_log_sink(mut self, sink: Arc<dyn ExecutionLogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    /// Appends a step. Registration order is the execution order and is a
    /// correctness invariant, not cosmetic.
    pub fn add_step(mut self, step: impl SagaStep<S> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Returns the number of registered steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Runs the saga protocol for one context.
    #[tracing::instrument(
        skip(self, ctx),
        fields(saga_id = %ctx.saga_id(), saga_type = %ctx.saga_type())
    )]
    pub async fn execute(&self, mut ctx: SagaContext<S>) -> SagaResult<S> {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();

        if let Some(duplicate) = self.duplicate_step_name() {
            return self
                .abort_for_anomaly(ctx, SagaError::DuplicateStep(duplicate), saga_start)
                .await;
        }

        // Indices of successfully executed steps, drained back-to-front
        // during compensation.
        let mut compensable: Vec<usize> = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            if !step.should_execute(&ctx) {
                tracing::debug!(step = step.name(), "step skipped by execution predicate");
                continue;
            }

            let result = self.execute_with_retries(step.as_ref(), &mut ctx).await;
            ctx.record_step_result(step.name(), result.clone());

            if result.is_success() {
                compensable.push(index);
                continue;
            }

            if step.is_mandatory() {
                tracing::warn!(
                    step = step.name(),
                    error = result.message(),
                    "mandatory step failed, starting compensation"
                );
                self.compensate_all(&mut ctx, &compensable).await;

                self.publisher.saga_compensated(&ctx).await;
                metrics::counter!("saga_compensated_total").increment(1);
                metrics::histogram!("saga_duration_seconds")
                    .record(saga_start.elapsed().as_secs_f64());

                let message = result.message().map(str::to_string);
                return SagaResult::failed(ctx, message, result.shared_error());
            }

            tracing::warn!(
                step = step.name(),
                error = result.message(),
                "optional step failed, continuing"
            );
        }

        ctx.complete();
        self.publisher.saga_completed(&ctx).await;
        metrics::counter!("saga_completed_total").increment(1);
        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
        tracing::info!("saga completed");

        SagaResult::completed(ctx)
    }

    /// Attempts a step up to `1 + max_retries` times, suspending for the
    /// step's retry delay between attempts. The execution predicate is not
    /// re-evaluated between attempts.
    async fn execute_with_retries(
        &self,
        step: &dyn SagaStep<S>,
        ctx: &mut SagaContext<S>,
    ) -> SagaStepResult {
        let attempts = step.max_retries() + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.log_sink
                .record(SagaExecutionLog::new(ctx, step.name(), StepStatus::Started));

            let attempt_start = Instant::now();
            let result = self.guarded_execute(step, ctx).await;
            let elapsed = attempt_start.elapsed();
            metrics::histogram!("saga_step_duration_seconds").record(elapsed.as_secs_f64());

            if result.is_success() {
                let mut entry = SagaExecutionLog::new(ctx, step.name(), StepStatus::Completed)
                    .with_duration(elapsed);
                if let Some(message) = result.message() {
                    entry = entry.with_message(message);
                }
                self.log_sink.record(entry);
                tracing::info!(step = step.name(), attempt, "step completed");
                return result;
            }

            let mut entry = SagaExecutionLog::new(ctx, step.name(), StepStatus::Failed)
                .with_duration(elapsed);
            if let Some(message) = result.message() {
                entry = entry.with_message(message);
            }
            if let Some(error) = result.error() {
                entry = entry.with_error(error);
            }
            self.log_sink.record(entry);
            tracing::warn!(
                step = step.name(),
                attempt,
                error = result.message(),
                "step attempt failed"
            );

            if attempt >= attempts {
                return result;
            }
            metrics::counter!("saga_step_retries_total").increment(1);
            tokio::time::sleep(step.retry_delay()).await;
        }
    }

    /// Compensates previously successful steps in strict reverse order of
    /// execution. Compensation failures are recorded and counted but never
    /// stop the loop; every entry gets a best-effort attempt.
    async fn compensate_all(&self, ctx: &mut SagaContext<S>, compensable: &[usize]) {
        ctx.start_compensation();

        for &index in compensable.iter().rev() {
            let step = &self.steps[index];
            self.log_sink.record(SagaExecutionLog::new(
                ctx,
                step.name(),
                StepStatus::Compensating,
            ));

            let attempt_start = Instant::now();
            let result = self.guarded_compensate(step.as_ref(), ctx).await;
            let elapsed = attempt_start.elapsed();

            if result.is_success() {
                self.log_sink.record(
                    SagaExecutionLog::new(ctx, step.name(), StepStatus::Compensated)
                        .with_duration(elapsed),
                );
                tracing::info!(step = step.name(), "step compensated");
            } else {
                metrics::counter!("saga_compensation_failures_total").increment(1);
                let reason = result.message().unwrap_or("unknown").to_string();
                self.log_sink.record(
                    SagaExecutionLog::new(ctx, step.name(), StepStatus::Failed)
                        .with_duration(elapsed)
                        .with_error(SagaError::CompensationFailed {
                            step: step.name().to_string(),
                            reason: reason.clone(),
                        }),
                );
                tracing::warn!(
                    step = step.name(),
                    error = %reason,
                    "compensation failed, continuing with remaining steps"
                );
            }
        }

        ctx.mark_compensated();
    }

    /// Runs `execute` behind a panic guard; a panic becomes a failure
    /// result carrying [`SagaError::StepPanicked`].
    async fn guarded_execute(
        &self,
        step: &dyn SagaStep<S>,
        ctx: &mut SagaContext<S>,
    ) -> SagaStepResult {
        match AssertUnwindSafe(step.execute(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => self.panic_result(step.name(), payload.as_ref()),
        }
    }

    /// Runs `compensate` behind the same panic guard.
    async fn guarded_compensate(
        &self,
        step: &dyn SagaStep<S>,
        ctx: &mut SagaContext<S>,
    ) -> SagaStepResult {
        match AssertUnwindSafe(step.compensate(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => self.panic_result(step.name(), payload.as_ref()),
        }
    }

    fn panic_result(&self, step_name: &str, payload: &(dyn Any + Send)) -> SagaStepResult {
        let reason = panic_message(payload);
        tracing::error!(step = step_name, %reason, "step panicked");
        SagaStepResult::failure_with(
            format!("step '{step_name}' panicked: {reason}"),
            SagaError::StepPanicked(step_name.to_string()),
        )
    }

    /// The `Failed` path: an anomaly detected by the engine itself, outside
    /// the normal step contract. Nothing ran, so there is nothing to
    /// compensate.
    async fn abort_for_anomaly(
        &self,
        mut ctx: SagaContext<S>,
        error: SagaError,
        saga_start: Instant,
    ) -> SagaResult<S> {
        let message = error.to_string();
        let shared: SharedError = Arc::new(error);
        tracing::error!(reason = %message, "saga rejected by engine");

        ctx.fail(message.clone(), Some(shared.clone()));
        self.publisher.saga_failed(&ctx).await;
        metrics::counter!("saga_failed_total").increment(1);
        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());

        SagaResult::failed(ctx, Some(message), Some(shared))
    }

    fn duplicate_step_name(&self) -> Option<String> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name()) {
                return Some(step.name().to_string());
            }
        }
        None
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
