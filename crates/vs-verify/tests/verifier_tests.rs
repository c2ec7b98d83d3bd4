use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use vs_math::{Expr, NumericMode, Number};
use vs_sandbox::{
    CancellationFlag, CandidateSource, CapabilityPolicy, ExecutionLimits, ExecutionOutcome,
    SandboxRunner, StaticValidator, StructuredValue, ValidatedSource, ValidationVerdict,
};
use vs_verify::{
    default_backends, BackendCharacter, BackendError, BackendResult, Comparator, Consensus,
    Recomputation, Tolerance, VerificationBackend, Verifier, VerifierConfig,
};

fn accept(text: &str) -> ValidatedSource {
    let validator = StaticValidator::new(CapabilityPolicy::shared_mathematics());
    match validator.validate(&CandidateSource::new(text)) {
        ValidationVerdict::Accepted(source) => source,
        ValidationVerdict::Rejected(r) => panic!("unexpected rejection: {r}"),
    }
}

async fn primary(source: &ValidatedSource) -> StructuredValue {
    let runner = SandboxRunner::new(CapabilityPolicy::shared_mathematics(), ExecutionLimits::default());
    match runner.run(source, NumericMode::Exact, &CancellationFlag::new()).await {
        ExecutionOutcome::Success(success) => success.result,
        ExecutionOutcome::Failure(failure) => panic!("primary run failed: {}", failure.message),
    }
}

fn default_verifier() -> Verifier {
    Verifier::from_config(
        &VerifierConfig::default(),
        &CapabilityPolicy::shared_mathematics(),
        &ExecutionLimits::default(),
    )
}

enum Behaviour {
    Value(f64),
    Fail,
    Hang,
}

struct Scripted {
    name: &'static str,
    behaviour: Behaviour,
}

#[async_trait]
impl VerificationBackend for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn label(&self) -> &str {
        "scripted engine"
    }

    fn character(&self) -> BackendCharacter {
        BackendCharacter::NumericFloat
    }

    async fn recompute(
        &self,
        _request: &Recomputation,
        _cancel: &CancellationFlag,
    ) -> BackendResult<StructuredValue> {
        match self.behaviour {
            Behaviour::Value(v) => Ok(StructuredValue::Expression(Expr::Num(Number::Float(v)))),
            Behaviour::Fail => Err(BackendError::Unavailable("engine offline".into())),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(BackendError::Cancelled)
            }
        }
    }
}

fn with_extra(extra: Scripted, tolerance: Tolerance, timeout: Duration) -> Verifier {
    let mut backends = default_backends(
        &CapabilityPolicy::shared_mathematics(),
        &ExecutionLimits::default(),
        50,
    );
    backends.push(Arc::new(extra));
    Verifier::new(backends, Comparator::new(tolerance), timeout)
}

#[tokio::test]
async fn arithmetic_agrees_on_every_engine() {
    let source = accept("set_result(2 + 2)");
    let primary = primary(&source).await;
    let report = default_verifier()
        .verify(&primary, &Recomputation::new(source), &CancellationFlag::new())
        .await;
    assert_eq!(report.tally(), "3/3");
    assert_eq!(report.consensus(), Consensus::Unanimous);
    assert!(report.verdicts.iter().all(|v| v.error.is_none()));
}

#[tokio::test]
async fn definite_integral_agrees_across_number_models() {
    let source = accept(
        "from sympy import symbols, integrate\nx = symbols('x')\nset_result(integrate(x**2, (x, 0, 1)))\n",
    );
    let primary = primary(&source).await;
    let report = default_verifier()
        .verify(&primary, &Recomputation::new(source), &CancellationFlag::new())
        .await;
    assert_eq!(report.tally(), "3/3");
    assert!(report.verdict("numeric-float").unwrap().matches);
}

#[tokio::test]
async fn outlier_beyond_tolerance_is_the_only_mismatch() {
    let source = accept("set_result(4)");
    let primary = primary(&source).await;
    let verifier = with_extra(
        Scripted {
            name: "drifting",
            behaviour: Behaviour::Value(4.0001),
        },
        Tolerance::relative(1e-6),
        Duration::from_secs(10),
    );
    let report = verifier
        .verify(&primary, &Recomputation::new(source), &CancellationFlag::new())
        .await;
    assert_eq!(report.tally(), "3/4");
    assert_eq!(report.consensus(), Consensus::Majority);
    let mismatched: Vec<&str> = report.mismatches().map(|v| v.backend.as_str()).collect();
    assert_eq!(mismatched, vec!["drifting"]);
    assert_eq!(report.verdict("drifting").unwrap().rendered, "4.0001");
}

#[tokio::test]
async fn failing_backend_is_recorded_not_raised() {
    let source = accept("set_result(4)");
    let primary = primary(&source).await;
    let verifier = with_extra(
        Scripted {
            name: "offline",
            behaviour: Behaviour::Fail,
        },
        Tolerance::default(),
        Duration::from_secs(10),
    );
    let report = verifier
        .verify(&primary, &Recomputation::new(source), &CancellationFlag::new())
        .await;
    assert_eq!(report.total(), 4);
    let offline = report.verdict("offline").unwrap();
    assert!(!offline.matches);
    assert!(offline.value.is_none());
    assert_eq!(offline.error.as_deref(), Some("backend unavailable: engine offline"));
}

#[tokio::test]
async fn hung_backend_does_not_hold_up_the_others() {
    let source = accept("set_result(4)");
    let primary = primary(&source).await;
    let verifier = with_extra(
        Scripted {
            name: "hung",
            behaviour: Behaviour::Hang,
        },
        Tolerance::default(),
        Duration::from_secs(2),
    );
    let started = std::time::Instant::now();
    let report = verifier
        .verify(&primary, &Recomputation::new(source), &CancellationFlag::new())
        .await;
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(report.tally(), "3/4");
    let names: Vec<&str> = report.verdicts.iter().map(|v| v.backend.as_str()).collect();
    assert_eq!(
        names,
        vec!["symbolic-exact", "numeric-float", "arbitrary-precision", "hung"]
    );
}
