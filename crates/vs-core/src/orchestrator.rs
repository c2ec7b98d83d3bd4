//! Pipeline orchestrator
//!
//! Drives one [`SolveRun`] through
//! parse → understand → generate → validate → execute → verify → explain
//! → visualize → assemble.
//!
//! # Failure policy
//! - understanding and generation collaborator errors fail the run
//! - a rejected candidate is regenerated once, with the rejection as
//!   feedback; a second rejection fails the run
//! - primary execution failures fail the run and are never retried here
//! - verification never fails the run; disagreement is reported
//! - explanation and visualization errors degrade to fallbacks
//! - cancellation fails the run at the next suspension point

use crate::collaborators::{
    Collaborators, Explanation, ExplanationRequest, GenerationRequest, Understanding,
};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};
use crate::events::{EventPayload, EventSink, ProgressEvent};
use crate::incidents::{Incident, IncidentFeed};
use crate::response::{FailureReport, Solution, SolveResponse};
use crate::run::{ProblemStatement, RunId, SolveRun};
use crate::stage::Stage;
use std::future::Future;
use tokio::sync::{broadcast, mpsc::UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};
use vs_math::NumericMode;
use vs_sandbox::{
    CachedValidator, CancellationFlag, ExecutionOutcome, FailureKind, SandboxRunner, ValidatedSource,
    ValidationVerdict,
};
use vs_verify::{Recomputation, Verifier};

/// Candidates generated per run before a rejection becomes final
pub const MAX_GENERATION_ATTEMPTS: u32 = 2;

/// Longest error message carried by a failure report
const MAX_ERROR_CHARS: usize = 500;

/// Staged solve pipeline
///
/// Cheap to clone; clones share the validation cache and the incident
/// feed. Each run owns its own state, so concurrent runs need no locking.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    validator: CachedValidator,
    runner: SandboxRunner,
    verifier: Verifier,
    collaborators: Collaborators,
    incidents: IncidentFeed,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Create an orchestrator with the built-in verification backends
    ///
    /// # Errors
    /// Returns the errors of [`PipelineConfig::validate`].
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = config.capability_policy();
        let verifier = Verifier::from_config(&config.verifier, &policy, &config.sandbox);
        Ok(Self {
            validator: CachedValidator::with_capacity(policy.clone(), config.validation_cache),
            runner: SandboxRunner::new(policy, config.sandbox.clone()),
            incidents: IncidentFeed::new(config.events.incident_capacity),
            verifier,
            collaborators,
            config,
        })
    }

    /// Replace the verifier, e.g. to add backends
    #[must_use]
    pub fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = verifier;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Receive incidents from every later run
    #[must_use]
    pub fn subscribe_incidents(&self) -> broadcast::Receiver<Incident> {
        self.incidents.subscribe()
    }

    /// Solve `problem` without progress events
    pub async fn solve(&self, problem: ProblemStatement) -> SolveResponse {
        self.run(RunId::new(), problem, None, CancellationFlag::new())
            .await
    }

    /// Solve `problem`, streaming progress to `events`
    pub async fn solve_with_events(
        &self,
        problem: ProblemStatement,
        events: UnboundedSender<ProgressEvent>,
    ) -> SolveResponse {
        self.run(RunId::new(), problem, Some(events), CancellationFlag::new())
            .await
    }

    /// Spawn a run and return a handle that can cancel it
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn start(
        &self,
        problem: ProblemStatement,
        events: Option<UnboundedSender<ProgressEvent>>,
    ) -> SolveHandle {
        let run_id = RunId::new();
        let cancel = CancellationFlag::new();
        let this = self.clone();
        let flag = cancel.clone();
        let task = tokio::spawn(async move { this.run(run_id, problem, events, flag).await });
        SolveHandle {
            run_id,
            cancel,
            task,
        }
    }

    async fn run(
        &self,
        run_id: RunId,
        problem: ProblemStatement,
        events: Option<UnboundedSender<ProgressEvent>>,
        cancel: CancellationFlag,
    ) -> SolveResponse {
        let span = info_span!("solve", run_id = %run_id);
        async move {
            let mut sink = EventSink::new(run_id, events, &self.config.events);
            info!(problem = %problem.summary(), "solve started");
            sink.emit(
                Stage::Parsed,
                "problem received",
                EventPayload::Problem {
                    latex: problem.latex.clone(),
                },
            );
            let mut run = SolveRun::new(run_id, problem);
            match self.drive(&mut run, &mut sink, &cancel).await {
                Ok(solution) => {
                    info!(
                        attempts = solution.generation_attempts,
                        tally = %solution.verification.tally(),
                        elapsed_ms = solution.elapsed.as_millis(),
                        "solve assembled"
                    );
                    SolveResponse::Solved(Box::new(solution))
                }
                Err(error) => SolveResponse::Failed(Self::fail(&mut run, &mut sink, error)),
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        run: &mut SolveRun,
        sink: &mut EventSink,
        cancel: &CancellationFlag,
    ) -> Result<Solution, PipelineError> {
        let understanding = guarded(cancel, self.collaborators.interpreter.understand(run.problem()))
            .await?
            .map_err(|source| PipelineError::Collaborator {
                stage: Stage::Understood,
                source,
            })?;
        run.advance(Stage::Understood)?;
        sink.emit(
            Stage::Understood,
            format!("understood as {}", understanding.category),
            EventPayload::Understanding {
                category: understanding.category.clone(),
                description: understanding.description.clone(),
            },
        );

        let source = self.generate_validated(run, sink, &understanding, cancel).await?;

        let outcome = self.runner.run(&source, NumericMode::Exact, cancel).await;
        run.record_outcome(outcome.clone())
            .map_err(|err| PipelineError::Internal {
                message: err.to_string(),
            })?;
        let success = match outcome {
            ExecutionOutcome::Success(success) => success,
            ExecutionOutcome::Failure(failure) => {
                warn!(kind = %failure.kind, message = %failure.message, "primary execution failed");
                if failure.kind != FailureKind::Cancelled {
                    self.incidents.publish(Incident::ExecutionFailed {
                        run_id: run.id(),
                        source: source.fingerprint().to_string(),
                        kind: failure.kind,
                        message: failure.message.clone(),
                    });
                }
                return Err(failure.into());
            }
        };
        run.advance(Stage::Executed)?;
        sink.emit(
            Stage::Executed,
            format!(
                "executed in {} ms with {} steps",
                success.elapsed.as_millis(),
                success.steps.len()
            ),
            EventPayload::None,
        );
        if self.config.events.step_events {
            for step in &success.steps {
                sink.emit(
                    Stage::Executed,
                    format!("step {}", step.index + 1),
                    EventPayload::Step(step.clone()),
                );
            }
        }

        let request =
            Recomputation::new(source.clone()).with_statement(run.problem().latex.clone());
        let report = guarded(cancel, self.verifier.verify(&success.result, &request, cancel)).await?;
        if report.matches() < report.total() {
            self.incidents.publish(Incident::VerificationMismatch {
                run_id: run.id(),
                source: source.fingerprint().to_string(),
                tally: report.tally(),
                backends: report.mismatches().map(|v| v.backend.clone()).collect(),
            });
        }
        run.record_report(report.clone());
        run.advance(Stage::Verified)?;
        sink.emit(
            Stage::Verified,
            format!("verified by {} engines", report.tally()),
            EventPayload::Verification {
                tally: report.tally(),
                consensus: report.consensus(),
            },
        );

        let mut warnings = Vec::new();
        let explain_request = ExplanationRequest {
            problem: run.problem().clone(),
            steps: success.steps.clone(),
            result: success.result.clone(),
            result_latex: success.result_latex.clone(),
        };
        let explanation = match guarded(cancel, self.collaborators.explainer.explain(&explain_request)).await? {
            Ok(explanation) => explanation,
            Err(err) => {
                warn!(error = %err, "explainer failed, using raw steps");
                warnings.push(format!("explanation unavailable: {err}"));
                Explanation::raw(&success.steps, &success.result_latex)
            }
        };
        run.advance(Stage::Explained)?;
        sink.emit(
            Stage::Explained,
            if explanation.fallback {
                "raw explanation"
            } else {
                "explanation ready"
            },
            EventPayload::Explanation {
                fallback: explanation.fallback,
            },
        );

        let visualizations = match guarded(cancel, self.collaborators.renderer.render(&success.plots)).await? {
            Ok(visualizations) => visualizations,
            Err(err) => {
                warn!(error = %err, plots = success.plots.len(), "renderer failed, dropping plots");
                warnings.push(format!("visualizations unavailable: {err}"));
                Vec::new()
            }
        };
        run.advance(Stage::Visualized)?;
        sink.emit(
            Stage::Visualized,
            format!("{} visualizations", visualizations.len()),
            EventPayload::Visualizations {
                count: visualizations.len(),
            },
        );

        run.advance(Stage::Assembled)?;
        sink.emit(Stage::Assembled, "solution assembled", EventPayload::None);

        Ok(Solution {
            run_id: run.id(),
            problem: run.problem().clone(),
            understanding,
            code: source.source().as_str().to_string(),
            generation_attempts: run.generation_attempts(),
            result: success.result,
            result_latex: success.result_latex,
            steps: success.steps,
            plots: success.plots,
            stdout: success.stdout,
            verification: report,
            explanation,
            visualizations,
            warnings,
            operations: success.operations,
            elapsed: run.elapsed(),
        })
    }

    /// Generate until a candidate is accepted or attempts run out
    async fn generate_validated(
        &self,
        run: &mut SolveRun,
        sink: &mut EventSink,
        understanding: &Understanding,
        cancel: &CancellationFlag,
    ) -> Result<ValidatedSource, PipelineError> {
        let mut feedback = None;
        loop {
            let attempt = run.generation_attempts() + 1;
            let request = GenerationRequest {
                problem: run.problem().clone(),
                understanding: understanding.clone(),
                attempt,
                feedback: feedback.take(),
            };
            let candidate = guarded(cancel, self.collaborators.generator.generate(&request))
                .await?
                .map_err(|source| PipelineError::Collaborator {
                    stage: Stage::CodeGenerated,
                    source,
                })?;
            run.record_candidate(candidate.clone())?;
            let snippet = sink.snippet(candidate.as_str());
            sink.emit(
                Stage::CodeGenerated,
                format!("candidate {attempt} generated"),
                EventPayload::Code { attempt, snippet },
            );

            match self.validator.validate(&candidate) {
                ValidationVerdict::Accepted(source) => {
                    run.advance(Stage::Validated)?;
                    sink.emit(Stage::Validated, "candidate accepted", EventPayload::None);
                    return Ok(source);
                }
                ValidationVerdict::Rejected(rejection) => {
                    warn!(attempt, rejection = %rejection, "candidate rejected");
                    self.incidents.publish(Incident::ValidationRejected {
                        run_id: run.id(),
                        source: candidate.fingerprint().to_string(),
                        attempt,
                        rejection: rejection.clone(),
                    });
                    sink.emit(
                        Stage::CodeGenerated,
                        format!("candidate {attempt} rejected"),
                        EventPayload::Rejection {
                            violation: rejection.kind,
                            construct: rejection.construct.clone(),
                            line: rejection.at.line,
                        },
                    );
                    if attempt >= MAX_GENERATION_ATTEMPTS {
                        return Err(rejection.into());
                    }
                    feedback = Some(rejection);
                }
            }
        }
    }

    fn fail(run: &mut SolveRun, sink: &mut EventSink, error: PipelineError) -> FailureReport {
        let reached = run.stage();
        if let Err(err) = run.advance(Stage::Failed) {
            warn!(error = %err, "run already terminal");
        }
        let error = truncated(error);
        warn!(stage = %reached, error = %error, "solve failed");
        sink.emit(
            Stage::Failed,
            format!("failed after {reached}"),
            EventPayload::Failure {
                error: error.to_string(),
            },
        );
        FailureReport {
            run_id: run.id(),
            construct: error.construct().map(str::to_string),
            error,
            stage: reached,
            elapsed: run.elapsed(),
        }
    }
}

/// Handle to a spawned run
#[derive(Debug)]
pub struct SolveHandle {
    run_id: RunId,
    cancel: CancellationFlag,
    task: JoinHandle<SolveResponse>,
}

impl SolveHandle {
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Request cancellation; a no-op once the run has finished
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the response
    pub async fn outcome(self) -> SolveResponse {
        let run_id = self.run_id;
        self.task.await.unwrap_or_else(|err| {
            SolveResponse::Failed(FailureReport {
                run_id,
                error: PipelineError::Internal {
                    message: err.to_string(),
                },
                stage: Stage::Parsed,
                construct: None,
                elapsed: std::time::Duration::ZERO,
            })
        })
    }
}

/// Await `future` unless the run is cancelled first
async fn guarded<F: Future>(
    cancel: &CancellationFlag,
    future: F,
) -> Result<F::Output, PipelineError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(PipelineError::Cancelled),
        output = future => Ok(output),
    }
}

fn truncated(error: PipelineError) -> PipelineError {
    let cut = |message: String| -> String {
        if message.chars().count() <= MAX_ERROR_CHARS {
            message
        } else {
            let mut short: String = message.chars().take(MAX_ERROR_CHARS).collect();
            short.push_str("...");
            short
        }
    };
    match error {
        PipelineError::Timeout { message } => PipelineError::Timeout {
            message: cut(message),
        },
        PipelineError::Runtime { message } => PipelineError::Runtime {
            message: cut(message),
        },
        PipelineError::MissingResult { message } => PipelineError::MissingResult {
            message: cut(message),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn long_runtime_messages_are_cut() {
        let error = truncated(PipelineError::Runtime {
            message: "x".repeat(MAX_ERROR_CHARS + 10),
        });
        match error {
            PipelineError::Runtime { message } => {
                assert_eq!(message.chars().count(), MAX_ERROR_CHARS + 3);
                assert!(message.ends_with("..."));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_messages_are_kept() {
        let error = PipelineError::MissingResult {
            message: "set_result was never called".into(),
        };
        assert_eq!(truncated(error.clone()), error);
    }

    #[tokio::test]
    async fn guarded_yields_to_cancellation() {
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let result = guarded(&cancel, std::future::pending::<()>()).await;
        assert_eq!(result, Err(PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn guarded_passes_output_through() {
        let result = guarded(&CancellationFlag::new(), async { 7 }).await;
        assert_eq!(result, Ok(7));
    }
}
