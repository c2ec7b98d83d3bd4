//! Sandbox runner
//!
//! Runs a [`ValidatedSource`] on the blocking pool while the calling task
//! waits on three things: the run itself, its deadline and the caller's
//! [`CancellationFlag`]. Whichever finishes first decides the outcome. The
//! interpreter checks its [`AbortSignal`] between steps, so a deadline or
//! cancellation also stops the worker thread shortly after.

use crate::interpreter;
use crate::limits::{AbortReason, AbortSignal, ExecutionLimits};
use crate::outcome::{ExecutionOutcome, FailureKind};
use crate::policy::CapabilityPolicy;
use crate::validator::ValidatedSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info_span, warn, Instrument};
use vs_math::NumericMode;

/// Cooperative cancellation shared between a caller and its runs
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<CancelState>);

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationFlag {
    /// Create a flag that is not cancelled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every run observing this flag
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::Release);
        self.0.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Trips the signal when the waiting side goes away, so an abandoned run
/// does not keep a blocking thread busy
struct AbortGuard(AbortSignal);

impl Drop for AbortGuard {
    fn drop(&mut self) {
        self.0.trip(AbortReason::Cancelled);
    }
}

/// Executes validated programs under a policy and resource limits
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    policy: Arc<CapabilityPolicy>,
    limits: ExecutionLimits,
}

impl SandboxRunner {
    /// Create a new runner
    #[must_use]
    pub fn new(policy: Arc<CapabilityPolicy>, limits: ExecutionLimits) -> Self {
        Self { policy, limits }
    }

    #[must_use]
    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    #[must_use]
    pub fn policy(&self) -> &Arc<CapabilityPolicy> {
        &self.policy
    }

    /// Run `source` in `mode`
    ///
    /// Never fails: every problem is reported as an [`ExecutionOutcome`].
    /// Steps recorded by a run that does not succeed are discarded.
    pub async fn run(
        &self,
        source: &ValidatedSource,
        mode: NumericMode,
        cancel: &CancellationFlag,
    ) -> ExecutionOutcome {
        let span = info_span!(
            "sandbox_run",
            fingerprint = %source.fingerprint().short(),
            mode = %mode,
        );
        self.run_inner(source, mode, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        source: &ValidatedSource,
        mode: NumericMode,
        cancel: &CancellationFlag,
    ) -> ExecutionOutcome {
        if cancel.is_cancelled() {
            return ExecutionOutcome::failure(FailureKind::Cancelled, "execution was cancelled");
        }

        let signal = AbortSignal::new();
        let guard = AbortGuard(signal.clone());
        let program = source.program();
        let policy = Arc::clone(&self.policy);
        let limits = self.limits.clone();
        let timeout = limits.timeout;
        let worker_signal = signal.clone();
        let mut handle = tokio::task::spawn_blocking(move || {
            interpreter::execute(&program, policy, mode, limits, worker_signal)
        });

        let outcome = tokio::select! {
            biased;
            joined = &mut handle => match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(error = %err, "sandbox worker failed");
                    ExecutionOutcome::failure(FailureKind::Runtime, format!("sandbox worker failed: {err}"))
                }
            },
            () = tokio::time::sleep(timeout) => {
                signal.trip(AbortReason::Deadline);
                ExecutionOutcome::failure(
                    FailureKind::Timeout,
                    format!("execution exceeded its deadline of {timeout:?}"),
                )
            }
            () = cancel.cancelled() => {
                signal.trip(AbortReason::Cancelled);
                ExecutionOutcome::failure(FailureKind::Cancelled, "execution was cancelled")
            }
        };
        drop(guard);

        match &outcome {
            ExecutionOutcome::Success(s) => debug!(
                steps = s.steps.len(),
                operations = s.operations,
                elapsed_ms = s.elapsed.as_millis(),
                "run succeeded"
            ),
            ExecutionOutcome::Failure(f) => debug!(kind = %f.kind, message = %f.message, "run failed"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{CandidateSource, StaticValidator, ValidationVerdict};
    use std::time::{Duration, Instant};

    fn validated(text: &str) -> ValidatedSource {
        let validator = StaticValidator::new(CapabilityPolicy::shared_mathematics());
        match validator.validate(&CandidateSource::new(text)) {
            ValidationVerdict::Accepted(v) => v,
            ValidationVerdict::Rejected(r) => panic!("rejected: {r:?}"),
        }
    }

    fn runner(timeout: Duration) -> SandboxRunner {
        SandboxRunner::new(
            CapabilityPolicy::shared_mathematics(),
            ExecutionLimits::default()
                .with_timeout(timeout)
                .with_max_operations(u64::MAX),
        )
    }

    #[tokio::test]
    async fn successful_run() {
        let source = validated("set_result(2 + 2)");
        let outcome = runner(Duration::from_secs(5))
            .run(&source, NumericMode::Exact, &CancellationFlag::new())
            .await;
        assert_eq!(outcome.success().unwrap().result.to_text(), "4");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deadline_stops_busy_loop() {
        let source = validated("while True:\n    pass\n");
        let started = Instant::now();
        let outcome = runner(Duration::from_millis(100))
            .run(&source, NumericMode::Exact, &CancellationFlag::new())
            .await;
        assert_eq!(outcome.failure_info().unwrap().kind, FailureKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_wins() {
        let source = validated("while True:\n    pass\n");
        let flag = CancellationFlag::new();
        let trigger = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let outcome = runner(Duration::from_secs(10))
            .run(&source, NumericMode::Exact, &flag)
            .await;
        assert_eq!(outcome.failure_info().unwrap().kind, FailureKind::Cancelled);
    }

    #[tokio::test]
    async fn already_cancelled_does_not_start() {
        let flag = CancellationFlag::new();
        flag.cancel();
        let outcome = runner(Duration::from_secs(5))
            .run(&validated("set_result(1)"), NumericMode::Exact, &flag)
            .await;
        assert_eq!(outcome.failure_info().unwrap().kind, FailureKind::Cancelled);
    }
}
