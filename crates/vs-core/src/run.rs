//! Per-request run state
//!
//! A [`SolveRun`] is owned by the task driving it. Nothing else mutates it
//! and nothing outlives the response built from it.

use crate::error::TransitionError;
use crate::stage::{validate_transition, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use ulid::Ulid;
use vs_sandbox::{CandidateSource, ExecutionOutcome};
use vs_verify::VerificationReport;

/// Unique identifier of one solve run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Ulid);

impl RunId {
    /// Create a fresh, time-ordered id
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    #[must_use]
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical problem handed in by the input stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemStatement {
    /// Canonical LaTeX form
    pub latex: String,
    /// Informal wording, if any
    #[serde(default)]
    pub text: String,
}

impl ProblemStatement {
    /// Create a statement from its LaTeX form
    #[must_use]
    pub fn new(latex: impl Into<String>) -> Self {
        Self {
            latex: latex.into(),
            text: String::new(),
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Text used when a single line is wanted
    #[must_use]
    pub fn summary(&self) -> &str {
        if self.text.trim().is_empty() {
            &self.latex
        } else {
            &self.text
        }
    }
}

/// Outcome already recorded for this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("execution outcome already recorded")]
pub struct OutcomeRecorded;

/// Mutable state of one solve request
#[derive(Debug)]
pub struct SolveRun {
    id: RunId,
    problem: ProblemStatement,
    stage: Stage,
    candidate: Option<CandidateSource>,
    generation_attempts: u32,
    outcome: Option<ExecutionOutcome>,
    report: Option<VerificationReport>,
    started: Instant,
}

impl SolveRun {
    /// Start a run at [`Stage::Parsed`]
    #[must_use]
    pub fn new(id: RunId, problem: ProblemStatement) -> Self {
        Self {
            id,
            problem,
            stage: Stage::Parsed,
            candidate: None,
            generation_attempts: 0,
            outcome: None,
            report: None,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> RunId {
        self.id
    }

    #[must_use]
    pub fn problem(&self) -> &ProblemStatement {
        &self.problem
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn candidate(&self) -> Option<&CandidateSource> {
        self.candidate.as_ref()
    }

    #[must_use]
    pub fn generation_attempts(&self) -> u32 {
        self.generation_attempts
    }

    #[must_use]
    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        self.outcome.as_ref()
    }

    #[must_use]
    pub fn report(&self) -> Option<&VerificationReport> {
        self.report.as_ref()
    }

    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    /// Move to `to`
    ///
    /// # Errors
    /// Returns [`TransitionError`] if the stage machine forbids the move; the
    /// run keeps its current stage.
    pub fn advance(&mut self, to: Stage) -> Result<(), TransitionError> {
        validate_transition(self.stage, to)?;
        tracing::debug!(run_id = %self.id, from = %self.stage, to = %to, "stage transition");
        self.stage = to;
        Ok(())
    }

    /// Record a freshly generated candidate and enter `CodeGenerated`
    ///
    /// # Errors
    /// Returns [`TransitionError`] if the run cannot (re-)enter
    /// `CodeGenerated`.
    pub fn record_candidate(&mut self, candidate: CandidateSource) -> Result<(), TransitionError> {
        self.advance(Stage::CodeGenerated)?;
        self.generation_attempts += 1;
        self.candidate = Some(candidate);
        Ok(())
    }

    /// Store the primary execution outcome; written at most once
    ///
    /// # Errors
    /// Returns [`OutcomeRecorded`] on a second call.
    pub fn record_outcome(&mut self, outcome: ExecutionOutcome) -> Result<(), OutcomeRecorded> {
        if self.outcome.is_some() {
            return Err(OutcomeRecorded);
        }
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Store the verification report
    ///
    /// Ignored unless the recorded outcome is a success.
    pub fn record_report(&mut self, report: VerificationReport) {
        if self.outcome.as_ref().is_some_and(ExecutionOutcome::is_success) {
            self.report = Some(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vs_sandbox::FailureKind;

    fn run() -> SolveRun {
        SolveRun::new(RunId::new(), ProblemStatement::new("1+1"))
    }

    #[test]
    fn backwards_moves_are_refused() {
        let mut run = run();
        run.advance(Stage::Understood).unwrap();
        assert!(run.advance(Stage::Parsed).is_err());
        assert_eq!(run.stage(), Stage::Understood);
    }

    #[test]
    fn candidates_count_attempts() {
        let mut run = run();
        run.advance(Stage::Understood).unwrap();
        run.record_candidate(CandidateSource::new("set_result(1)")).unwrap();
        run.record_candidate(CandidateSource::new("set_result(2)")).unwrap();
        assert_eq!(run.generation_attempts(), 2);
        assert_eq!(run.candidate().map(CandidateSource::as_str), Some("set_result(2)"));
    }

    #[test]
    fn outcome_is_written_once() {
        let mut run = run();
        let failed = ExecutionOutcome::failure(FailureKind::Runtime, "boom");
        run.record_outcome(failed.clone()).unwrap();
        assert_eq!(run.record_outcome(failed), Err(OutcomeRecorded));
    }

    #[test]
    fn report_needs_a_successful_outcome() {
        let mut run = run();
        run.record_outcome(ExecutionOutcome::failure(FailureKind::Timeout, "slow"))
            .unwrap();
        run.record_report(VerificationReport::default());
        assert!(run.report().is_none());
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn summary_prefers_text() {
        let p = ProblemStatement::new("\\int_0^1 x^2 dx");
        assert_eq!(p.summary(), "\\int_0^1 x^2 dx");
        assert_eq!(p.with_text("integrate x^2 from 0 to 1").summary(), "integrate x^2 from 0 to 1");
    }
}
