//! Cross-engine verifier
//!
//! Every backend runs as its own task under its own timeout and the run's
//! cancellation flag. The verifier waits for all of them and then emits
//! the verdicts in canonical order, whatever order they finished in.

use crate::backend::{default_backends, Recomputation, VerificationBackend};
use crate::comparator::Comparator;
use crate::config::VerifierConfig;
use crate::error::{BackendError, BackendResult};
use crate::report::{BackendVerdict, VerificationReport};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use vs_sandbox::{CancellationFlag, CapabilityPolicy, ExecutionLimits, StructuredValue};

/// Recomputes a primary result on several backends and compares
#[derive(Clone)]
pub struct Verifier {
    backends: Vec<Arc<dyn VerificationBackend>>,
    comparator: Comparator,
    timeout: Duration,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("backends", &self.backend_names())
            .field("comparator", &self.comparator)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Verifier {
    /// Create a verifier over `backends`, kept in the given order
    #[must_use]
    pub fn new(
        backends: Vec<Arc<dyn VerificationBackend>>,
        comparator: Comparator,
        timeout: Duration,
    ) -> Self {
        Self {
            backends,
            comparator,
            timeout,
        }
    }

    /// Verifier with the three built-in sandbox backends
    #[must_use]
    pub fn from_config(
        config: &VerifierConfig,
        policy: &Arc<CapabilityPolicy>,
        limits: &ExecutionLimits,
    ) -> Self {
        Self::new(
            default_backends(policy, limits, config.precise_digits),
            Comparator::new(config.tolerance),
            config.backend_timeout,
        )
    }

    /// Backend names in canonical order
    #[must_use]
    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    #[must_use]
    pub fn comparator(&self) -> &Comparator {
        &self.comparator
    }

    /// Recompute `request` on every backend and compare with `primary`
    ///
    /// Never fails. A backend that errors, times out or is cancelled gets a
    /// non-matching verdict.
    pub async fn verify(
        &self,
        primary: &StructuredValue,
        request: &Recomputation,
        cancel: &CancellationFlag,
    ) -> VerificationReport {
        let tasks = self.backends.iter().map(|backend| {
            let backend = Arc::clone(backend);
            let request = request.clone();
            let cancel = cancel.clone();
            let timeout = self.timeout;
            tokio::spawn(async move {
                let started = Instant::now();
                let result = recompute_bounded(backend.as_ref(), &request, &cancel, timeout).await;
                (result, started.elapsed())
            })
        });
        let joined = join_all(tasks).await;

        let verdicts: Vec<BackendVerdict> = self
            .backends
            .iter()
            .zip(joined)
            .map(|(backend, joined)| {
                let (result, elapsed) = joined.unwrap_or_else(|err| {
                    (Err(BackendError::Unavailable(err.to_string())), Duration::ZERO)
                });
                self.verdict(backend.as_ref(), primary, result, elapsed)
            })
            .collect();

        let report = VerificationReport { verdicts };
        info!(
            tally = %report.tally(),
            consensus = %report.consensus(),
            "verification finished"
        );
        report
    }

    fn verdict(
        &self,
        backend: &dyn VerificationBackend,
        primary: &StructuredValue,
        result: BackendResult<StructuredValue>,
        elapsed: Duration,
    ) -> BackendVerdict {
        let (value, rendered, matches, error) = match result {
            Ok(value) => {
                let matches = self.comparator.matches(primary, &value);
                if !matches {
                    debug!(backend = backend.name(), primary = %primary, recomputed = %value, "backend disagrees");
                }
                let rendered = value.to_text();
                (Some(value), rendered, matches, None)
            }
            Err(err) => {
                warn!(backend = backend.name(), error = %err, "backend produced no value");
                (None, format!("error: {err}"), false, Some(err.to_string()))
            }
        };
        BackendVerdict {
            backend: backend.name().to_string(),
            label: backend.label().to_string(),
            character: backend.character(),
            value,
            rendered,
            matches,
            error,
            elapsed,
        }
    }
}

async fn recompute_bounded(
    backend: &dyn VerificationBackend,
    request: &Recomputation,
    cancel: &CancellationFlag,
    timeout: Duration,
) -> BackendResult<StructuredValue> {
    if cancel.is_cancelled() {
        return Err(BackendError::Cancelled);
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(BackendError::Cancelled),
        bounded = tokio::time::timeout(timeout, backend.recompute(request, cancel)) => {
            bounded.unwrap_or(Err(BackendError::Timeout(timeout)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendCharacter;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use vs_math::{Expr, Number};
    use vs_sandbox::{CandidateSource, StaticValidator, ValidationVerdict};

    struct Fixed {
        name: &'static str,
        value: f64,
        delay: Duration,
    }

    #[async_trait]
    impl VerificationBackend for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn label(&self) -> &str {
            "fixed"
        }

        fn character(&self) -> BackendCharacter {
            BackendCharacter::NumericFloat
        }

        async fn recompute(
            &self,
            _request: &Recomputation,
            _cancel: &CancellationFlag,
        ) -> BackendResult<StructuredValue> {
            tokio::time::sleep(self.delay).await;
            Ok(StructuredValue::Expression(Expr::Num(Number::Float(self.value))))
        }
    }

    fn request() -> Recomputation {
        let validator = StaticValidator::new(CapabilityPolicy::shared_mathematics());
        match validator.validate(&CandidateSource::new("set_result(4)")) {
            ValidationVerdict::Accepted(source) => Recomputation::new(source),
            ValidationVerdict::Rejected(r) => panic!("rejected: {r}"),
        }
    }

    fn fixed(name: &'static str, value: f64, delay_ms: u64) -> Arc<dyn VerificationBackend> {
        Arc::new(Fixed {
            name,
            value,
            delay: Duration::from_millis(delay_ms),
        })
    }

    #[tokio::test]
    async fn verdicts_follow_canonical_order() {
        let verifier = Verifier::new(
            vec![fixed("slow", 4.0, 60), fixed("fast", 4.0, 0), fixed("mid", 4.0, 20)],
            Comparator::default(),
            Duration::from_secs(5),
        );
        let primary = StructuredValue::Expression(Expr::int(4));
        let report = verifier.verify(&primary, &request(), &CancellationFlag::new()).await;
        let names: Vec<&str> = report.verdicts.iter().map(|v| v.backend.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast", "mid"]);
        assert_eq!(report.tally(), "3/3");
    }

    #[tokio::test]
    async fn hung_backend_times_out_as_non_match() {
        let verifier = Verifier::new(
            vec![fixed("ok", 4.0, 0), fixed("hung", 4.0, 60_000)],
            Comparator::default(),
            Duration::from_millis(50),
        );
        let primary = StructuredValue::Expression(Expr::int(4));
        let report = verifier.verify(&primary, &request(), &CancellationFlag::new()).await;
        assert_eq!(report.total(), 2);
        let hung = report.verdict("hung").unwrap();
        assert!(!hung.matches);
        assert!(hung.error.as_deref().unwrap_or_default().contains("timed out"));
        assert!(report.verdict("ok").unwrap().matches);
    }

    #[tokio::test]
    async fn cancelled_run_still_reports_every_backend() {
        let verifier = Verifier::new(
            vec![fixed("a", 4.0, 10_000), fixed("b", 4.0, 10_000)],
            Comparator::default(),
            Duration::from_secs(30),
        );
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let primary = StructuredValue::Expression(Expr::int(4));
        let report = verifier.verify(&primary, &request(), &cancel).await;
        assert_eq!(report.total(), 2);
        assert_eq!(report.matches(), 0);
    }
}
