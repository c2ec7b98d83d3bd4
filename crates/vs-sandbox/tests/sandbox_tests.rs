use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::time::{Duration, Instant};
use vs_math::NumericMode;
use vs_sandbox::{
    CachedValidator, CancellationFlag, CandidateSource, CapabilityPolicy, ExecutionLimits,
    ExecutionOutcome, FailureKind, SandboxRunner, StaticValidator, StructuredValue,
    ValidatedSource, ValidationVerdict, ViolationKind,
};

fn validator() -> StaticValidator {
    StaticValidator::new(CapabilityPolicy::shared_mathematics())
}

fn accept(text: &str) -> ValidatedSource {
    match validator().validate(&CandidateSource::new(text)) {
        ValidationVerdict::Accepted(source) => source,
        ValidationVerdict::Rejected(r) => panic!("unexpected rejection: {r}"),
    }
}

fn runner() -> SandboxRunner {
    SandboxRunner::new(CapabilityPolicy::shared_mathematics(), ExecutionLimits::default())
}

async fn run(text: &str, mode: NumericMode) -> ExecutionOutcome {
    runner()
        .run(&accept(text), mode, &CancellationFlag::new())
        .await
}

#[test]
fn aliased_evaluation_is_rejected_at_its_first_use() {
    let verdict = validator().validate(&CandidateSource::new(
        "import math\nrun = eval\nset_result(run('2+2'))\n",
    ));
    let rejection = verdict.rejection().expect("should be rejected");
    assert_eq!(rejection.kind, ViolationKind::DynamicEvaluation);
    assert_eq!(rejection.construct, "eval");
    assert_eq!(rejection.at.line, 2);
}

#[test]
fn policy_loaded_from_toml_is_enforced() {
    let policy = CapabilityPolicy::from_toml_str(
        r#"
builtins = ["set_result", "abs"]
prelude = []

[modules.math]
symbols = ["sqrt"]

[denied]
open = "filesystem_access"
"#,
    )
    .unwrap();
    let validator = StaticValidator::new(std::sync::Arc::new(policy));
    assert!(validator
        .validate(&CandidateSource::new("import math\nset_result(abs(math.sqrt(4)))\n"))
        .is_accepted());
    let rejection = validator
        .validate(&CandidateSource::new("import sympy\n"))
        .rejection()
        .cloned()
        .unwrap();
    assert_eq!(rejection.kind, ViolationKind::DisallowedImport);
}

#[test]
fn cache_reuses_verdicts() {
    let cached = CachedValidator::new(CapabilityPolicy::shared_mathematics());
    let source = CandidateSource::new("set_result(1)");
    let first = cached.validate(&source);
    let second = cached.validate(&CandidateSource::new("set_result(1)"));
    assert_eq!(first, second);
    assert_eq!(cached.cached(), 1);
}

#[tokio::test]
async fn steps_keep_recording_order() {
    let outcome = run(
        "\
from sympy import Symbol, diff
x = Symbol('x')
f = x**3
record_step(f, description='start')
d1 = diff(f, x)
record_step(d1, description='first')
record_step(diff(d1, x), description='second')
set_result(diff(d1, x, 2))
",
        NumericMode::Exact,
    )
    .await;
    let success = outcome.success().expect("run should succeed");
    let described: Vec<_> = success
        .steps
        .iter()
        .map(|s| (s.index, s.description.clone().unwrap_or_default(), s.value.to_text()))
        .collect();
    assert_eq!(
        described,
        vec![
            (0, "start".to_string(), "x**3".to_string()),
            (1, "first".to_string(), "3*x**2".to_string()),
            (2, "second".to_string(), "6*x".to_string()),
        ]
    );
    assert_eq!(success.result.to_text(), "6");
}

#[tokio::test]
async fn definite_integral_is_exact() {
    let outcome = run(
        "\
from sympy import symbols, integrate
x = symbols('x')
set_result(integrate(x**2, (x, 0, 1)))
",
        NumericMode::Exact,
    )
    .await;
    let success = outcome.success().unwrap();
    assert_eq!(success.result.to_text(), "1/3");
    assert_eq!(success.result_latex, "\\frac{1}{3}");
}

#[tokio::test]
async fn float_mode_changes_representation_only() {
    let outcome = run("set_result(1/4 + 1/4)", NumericMode::Float).await;
    match &outcome.success().unwrap().result {
        StructuredValue::Expression(e) => {
            let value = e.as_number().expect("numeric result").to_f64();
            assert!((value - 0.5).abs() < 1e-12);
        }
        other => panic!("unexpected result {other}"),
    }
}

#[tokio::test]
async fn missing_result_is_a_failure() {
    let outcome = run("record_step(1)\nx = 2\n", NumericMode::Exact).await;
    let failure = outcome.failure_info().unwrap();
    assert_eq!(failure.kind, FailureKind::MissingResult);
}

#[tokio::test]
async fn second_set_result_fails_the_run() {
    let outcome = run("set_result(1)\nset_result(2)\n", NumericMode::Exact).await;
    let failure = outcome.failure_info().unwrap();
    assert_eq!(failure.kind, FailureKind::Runtime);
    assert!(failure.message.contains("already set"), "{}", failure.message);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn infinite_loop_times_out_and_host_stays_responsive() {
    let limits = ExecutionLimits::default()
        .with_timeout(Duration::from_millis(200))
        .with_max_operations(u64::MAX);
    let runner = SandboxRunner::new(CapabilityPolicy::shared_mathematics(), limits);
    let source = accept("n = 0\nwhile True:\n    n += 1\n");

    let ticker = tokio::spawn(async {
        let mut ticks = 0u32;
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ticks += 1;
        }
        ticks
    });

    let started = Instant::now();
    let outcome = runner
        .run(&source, NumericMode::Exact, &CancellationFlag::new())
        .await;
    assert_eq!(outcome.failure_info().unwrap().kind, FailureKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(ticker.await.unwrap(), 5);
}

#[tokio::test]
async fn runs_do_not_share_state() {
    let text = "xs = []\nxs.append(1)\nset_result(len(xs))\n";
    for _ in 0..2 {
        let outcome = run(text, NumericMode::Exact).await;
        assert_eq!(outcome.success().unwrap().result.to_text(), "1");
    }
}

#[tokio::test]
async fn huge_format_width_fails_without_allocating() {
    for text in [
        "s = f'{1:>1000000000000}'\nset_result(1)\n",
        "s = '{:>999999999}'.format(1)\nset_result(1)\n",
        "s = '%999999999d' % 1\nset_result(1)\n",
        "s = f'{2.5:.999999999f}'\nset_result(1)\n",
    ] {
        let started = Instant::now();
        let outcome = run(text, NumericMode::Exact).await;
        let failure = outcome.failure_info().unwrap();
        assert_eq!(failure.kind, FailureKind::Runtime, "{text}");
        assert!(failure.message.contains("ResourceError"), "{}", failure.message);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

#[tokio::test]
async fn repeated_squaring_hits_the_integer_width_limit() {
    let text = "x = 7**9999\nfor i in range(40):\n    x = x * x\nset_result(x)\n";
    let started = Instant::now();
    let outcome = run(text, NumericMode::Exact).await;
    let failure = outcome.failure_info().unwrap();
    assert_eq!(failure.kind, FailureKind::Runtime);
    assert!(failure.message.contains("bits exceeds"), "{}", failure.message);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn moderate_exact_integers_still_compute() {
    let outcome = run("x = 2**64\nset_result(x * x)\n", NumericMode::Exact).await;
    assert_eq!(
        outcome.success().unwrap().result.to_text(),
        "340282366920938463463374607431768211456"
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn validation_is_idempotent(body in "[a-z0-9 +*()=\\n]{0,40}") {
        let source = CandidateSource::new(body);
        let v = validator();
        prop_assert_eq!(v.validate(&source), v.validate(&source));
    }
}
