use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use vs_core::events::channel;
use vs_core::{
    CodeGenerator, Collaborators, EventPayload, Incident, PipelineConfig, PipelineError,
    PipelineOrchestrator, ProblemStatement, ProgressEvent, SolveResponse, Stage,
    MAX_GENERATION_ATTEMPTS,
};
use vs_sandbox::{CapabilityPolicy, ExecutionLimits, ViolationKind};
use vs_test_utils::{
    collaborators, fixtures, init_test_tracing, integral_problem, CountingRenderer, EchoExplainer,
    FixedBackend, FixedInterpreter, ScriptedGenerator, Stalled, Unreachable,
};
use vs_verify::{default_backends, Comparator, Tolerance, VerificationBackend, Verifier};

fn orchestrator(generator: &Arc<ScriptedGenerator>) -> PipelineOrchestrator {
    init_test_tracing();
    PipelineOrchestrator::new(PipelineConfig::new(), collaborators(Arc::clone(generator))).unwrap()
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn failure_of(response: &SolveResponse) -> (PipelineError, Stage) {
    let report = response.failure().expect("run should fail");
    (report.error.clone(), report.stage)
}

#[tokio::test]
async fn integral_is_solved_verified_and_assembled() {
    let generator = Arc::new(ScriptedGenerator::new([fixtures::INTEGRAL]));
    let (tx, mut rx) = channel();
    let response = orchestrator(&generator)
        .solve_with_events(integral_problem(), tx)
        .await;

    let solution = response.solution().expect("run should be solved");
    assert_eq!(solution.result.to_text(), "1/3");
    assert_eq!(solution.steps.len(), 3);
    assert_eq!(solution.steps.last().unwrap().value.to_text(), "1/3");
    assert_eq!(solution.verification.tally(), "3/3");
    assert_eq!(solution.generation_attempts, 1);
    assert_eq!(solution.code, fixtures::INTEGRAL);
    assert_eq!(solution.understanding.category, "calculus");
    assert_eq!(solution.visualizations.len(), 1);
    assert!(!solution.explanation.fallback);
    assert!(solution.warnings.is_empty());

    let events = drain(&mut rx);
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (0..events.len() as u64).collect::<Vec<_>>());
    assert!(events.windows(2).all(|w| w[0].stage <= w[1].stage));
    assert_eq!(events.last().unwrap().stage, Stage::Assembled);

    let steps: Vec<usize> = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Step(step) => Some(step.index),
            _ => None,
        })
        .collect();
    assert_eq!(steps, vec![0, 1, 2]);
    assert!(events.iter().any(|e| matches!(
        &e.payload,
        EventPayload::Verification { tally, .. } if tally == "3/3"
    )));
}

#[tokio::test]
async fn second_rejection_fails_without_a_third_generation() {
    let generator = Arc::new(ScriptedGenerator::new([
        fixtures::EVAL,
        fixtures::OPEN_FILE,
        fixtures::TWO_PLUS_TWO,
    ]));
    let response = orchestrator(&generator)
        .solve(ProblemStatement::new("2+2"))
        .await;

    let (error, stage) = failure_of(&response);
    assert_eq!(stage, Stage::CodeGenerated);
    assert!(matches!(
        error,
        PipelineError::ValidationRejected {
            violation: ViolationKind::FilesystemAccess,
            ..
        }
    ));
    assert_eq!(response.failure().unwrap().construct.as_deref(), Some("open"));
    assert_eq!(generator.calls(), MAX_GENERATION_ATTEMPTS as usize);

    let feedback = generator.feedback();
    assert!(feedback[0].is_none());
    let first = feedback[1].as_ref().expect("regeneration carries feedback");
    assert_eq!(first.kind, ViolationKind::DynamicEvaluation);
    assert_eq!(first.construct, "eval");
}

#[tokio::test]
async fn regenerated_candidate_recovers_the_run() {
    let generator = Arc::new(ScriptedGenerator::new([fixtures::EVAL, fixtures::TWO_PLUS_TWO]));
    let orchestrator = orchestrator(&generator);
    let mut incidents = orchestrator.subscribe_incidents();
    let response = orchestrator.solve(ProblemStatement::new("2+2")).await;

    let solution = response.solution().expect("second candidate should pass");
    assert_eq!(solution.generation_attempts, 2);
    assert_eq!(solution.result.to_text(), "4");
    match incidents.try_recv().unwrap() {
        Incident::ValidationRejected { attempt, rejection, .. } => {
            assert_eq!(attempt, 1);
            assert_eq!(rejection.construct, "eval");
        }
        other => panic!("unexpected incident {other:?}"),
    }
}

#[tokio::test]
async fn runtime_failure_is_not_retried() {
    let generator = Arc::new(ScriptedGenerator::new([
        fixtures::DIVIDE_BY_ZERO,
        fixtures::TWO_PLUS_TWO,
    ]));
    let orchestrator = orchestrator(&generator);
    let mut incidents = orchestrator.subscribe_incidents();
    let (tx, mut rx) = channel();
    let response = orchestrator
        .solve_with_events(ProblemStatement::new("1/0"), tx)
        .await;

    let (error, stage) = failure_of(&response);
    assert!(matches!(error, PipelineError::Runtime { .. }), "{error:?}");
    assert_eq!(stage, Stage::Validated);
    assert_eq!(generator.calls(), 1);
    assert!(matches!(
        incidents.try_recv().unwrap(),
        Incident::ExecutionFailed { .. }
    ));

    let events = drain(&mut rx);
    assert!(events.iter().all(|e| !matches!(e.payload, EventPayload::Step(_))));
    assert_eq!(events.last().unwrap().stage, Stage::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runaway_candidate_times_out() {
    let generator = Arc::new(ScriptedGenerator::new([fixtures::INFINITE_LOOP]));
    let limits = ExecutionLimits::default()
        .with_timeout(Duration::from_millis(200))
        .with_max_operations(u64::MAX);
    let config = PipelineConfig::new().with_limits(limits);
    let orchestrator =
        PipelineOrchestrator::new(config, collaborators(Arc::clone(&generator))).unwrap();
    let response = orchestrator.solve(ProblemStatement::new("loop")).await;
    let (error, stage) = failure_of(&response);
    assert!(matches!(error, PipelineError::Timeout { .. }), "{error:?}");
    assert_eq!(stage, Stage::Validated);
}

#[tokio::test]
async fn missing_result_fails_the_run() {
    let generator = Arc::new(ScriptedGenerator::new([fixtures::NO_RESULT]));
    let response = orchestrator(&generator)
        .solve(ProblemStatement::new("x"))
        .await;
    let (error, _) = failure_of(&response);
    assert!(matches!(error, PipelineError::MissingResult { .. }), "{error:?}");
}

#[tokio::test]
async fn enrichment_failures_degrade_gracefully() {
    let generator = Arc::new(ScriptedGenerator::new([fixtures::INTEGRAL]));
    let collaborators = Collaborators::new(
        Arc::new(FixedInterpreter::default()),
        generator,
        Arc::new(Unreachable),
        Arc::new(Unreachable),
    );
    let orchestrator = PipelineOrchestrator::new(PipelineConfig::new(), collaborators).unwrap();
    let response = orchestrator.solve(integral_problem()).await;

    let solution = response.solution().expect("enrichments must not fail the run");
    assert!(solution.explanation.fallback);
    assert_eq!(solution.explanation.steps.len(), 3);
    assert!(solution.visualizations.is_empty());
    assert_eq!(solution.plots.len(), 1);
    assert_eq!(solution.warnings.len(), 2);
}

#[tokio::test]
async fn unavailable_interpreter_fails_at_the_start() {
    let generator = Arc::new(ScriptedGenerator::new([fixtures::TWO_PLUS_TWO]));
    let code: Arc<dyn CodeGenerator> = generator.clone();
    let collaborators = Collaborators::new(
        Arc::new(Unreachable),
        code,
        Arc::new(EchoExplainer),
        Arc::new(CountingRenderer::default()),
    );
    let orchestrator = PipelineOrchestrator::new(PipelineConfig::new(), collaborators).unwrap();
    let response = orchestrator.solve(ProblemStatement::new("2+2")).await;
    let (error, stage) = failure_of(&response);
    assert_eq!(stage, Stage::Parsed);
    assert!(error.is_retryable());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn disagreement_is_reported_not_fatal() {
    let generator = Arc::new(ScriptedGenerator::new([fixtures::TWO_PLUS_TWO]));
    let mut backends: Vec<Arc<dyn VerificationBackend>> = default_backends(
        &CapabilityPolicy::shared_mathematics(),
        &ExecutionLimits::default(),
        50,
    );
    backends.push(Arc::new(FixedBackend::new("drifting", 4.0001)));
    let verifier = Verifier::new(
        backends,
        Comparator::new(Tolerance::relative(1e-6)),
        Duration::from_secs(10),
    );
    let orchestrator = orchestrator(&generator).with_verifier(verifier);
    let mut incidents = orchestrator.subscribe_incidents();
    let response = orchestrator.solve(ProblemStatement::new("2+2")).await;

    let solution = response.solution().expect("mismatch is informational");
    assert_eq!(solution.verification.tally(), "3/4");
    assert!(!solution.verification.verdict("drifting").unwrap().matches);
    match incidents.try_recv().unwrap() {
        Incident::VerificationMismatch { backends, .. } => {
            assert_eq!(backends, vec!["drifting".to_string()]);
        }
        other => panic!("unexpected incident {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_stops_a_stalled_run() {
    let generator = Arc::new(ScriptedGenerator::new([fixtures::TWO_PLUS_TWO]));
    let collaborators = Collaborators::new(
        Arc::new(Stalled),
        generator,
        Arc::new(EchoExplainer),
        Arc::new(CountingRenderer::default()),
    );
    let orchestrator = PipelineOrchestrator::new(PipelineConfig::new(), collaborators).unwrap();
    let handle = orchestrator.start(ProblemStatement::new("2+2"), None);
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();
    let response = tokio::time::timeout(Duration::from_secs(5), handle.outcome())
        .await
        .expect("cancelled run should finish promptly");
    let (error, stage) = failure_of(&response);
    assert_eq!(error, PipelineError::Cancelled);
    assert_eq!(stage, Stage::Parsed);
}

#[tokio::test]
async fn cancelling_an_assembled_run_changes_nothing() {
    let generator = Arc::new(ScriptedGenerator::new([fixtures::TWO_PLUS_TWO]));
    let (tx, mut rx) = channel();
    let handle = orchestrator(&generator).start(ProblemStatement::new("2+2"), Some(tx));
    while let Some(event) = rx.recv().await {
        if event.stage == Stage::Assembled {
            break;
        }
    }
    handle.cancel();
    let response = handle.outcome().await;
    assert!(response.is_solved());
}

#[tokio::test]
async fn concurrent_runs_are_independent() {
    let integral = Arc::new(ScriptedGenerator::new([fixtures::INTEGRAL]));
    let sum = Arc::new(ScriptedGenerator::new([fixtures::TWO_PLUS_TWO]));
    let first = orchestrator(&integral).start(integral_problem(), None);
    let second = orchestrator(&sum).start(ProblemStatement::new("2+2"), None);
    let (a, b) = tokio::join!(first.outcome(), second.outcome());
    assert_eq!(a.solution().unwrap().result.to_text(), "1/3");
    assert_eq!(b.solution().unwrap().result.to_text(), "4");
    assert_ne!(a.run_id(), b.run_id());
}

#[tokio::test]
async fn response_serializes_for_transport() {
    let generator = Arc::new(ScriptedGenerator::new([fixtures::EVAL]));
    let response = orchestrator(&generator)
        .solve(ProblemStatement::new("2+2"))
        .await;
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["body"]["error"]["kind"], "validation_rejected");
    assert_eq!(json["body"]["construct"], "eval");
}
