//! Final response of a solve run

use crate::collaborators::{Explanation, Understanding, Visualization};
use crate::error::PipelineError;
use crate::run::{ProblemStatement, RunId};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vs_sandbox::{PlotHandle, StepRecord, StructuredValue};
use vs_verify::VerificationReport;

/// Verified, explained solution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub run_id: RunId,
    pub problem: ProblemStatement,
    pub understanding: Understanding,
    /// Program that produced the result
    pub code: String,
    pub generation_attempts: u32,
    pub result: StructuredValue,
    pub result_latex: String,
    /// Intermediate values in production order
    pub steps: Vec<StepRecord>,
    pub plots: Vec<PlotHandle>,
    /// Captured `print` output
    pub stdout: String,
    pub verification: VerificationReport,
    pub explanation: Explanation,
    pub visualizations: Vec<Visualization>,
    /// Degradations the run recovered from
    pub warnings: Vec<String>,
    /// Interpreter steps spent by the primary execution
    pub operations: u64,
    #[serde(with = "vs_sandbox::limits::secs_f64")]
    pub elapsed: Duration,
}

/// Failed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub run_id: RunId,
    pub error: PipelineError,
    /// Last stage the run reached before failing
    pub stage: Stage,
    /// Offending construct for rejected candidates
    pub construct: Option<String>,
    #[serde(with = "vs_sandbox::limits::secs_f64")]
    pub elapsed: Duration,
}

/// What a caller receives for one problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
pub enum SolveResponse {
    Solved(Box<Solution>),
    Failed(FailureReport),
}

impl SolveResponse {
    #[must_use]
    pub fn is_solved(&self) -> bool {
        matches!(self, Self::Solved(_))
    }

    #[must_use]
    pub fn solution(&self) -> Option<&Solution> {
        match self {
            Self::Solved(solution) => Some(solution),
            Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&FailureReport> {
        match self {
            Self::Solved(_) => None,
            Self::Failed(report) => Some(report),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> RunId {
        match self {
            Self::Solved(solution) => solution.run_id,
            Self::Failed(report) => report.run_id,
        }
    }
}
