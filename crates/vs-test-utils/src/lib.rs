//! Testing utilities for the Verisolve workspace
//!
//! Scripted collaborators, candidate program fixtures and a fixed-value
//! verification backend.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vs_core::{
    CodeGenerator, CollaboratorError, CollaboratorResult, Collaborators, Explanation,
    ExplanationRequest, GenerationRequest, PlotRenderer, ProblemInterpreter, ProblemStatement,
    StepExplainer, Understanding, Visualization,
};
use vs_math::{Expr, Number};
use vs_sandbox::{CancellationFlag, CandidateSource, PlotHandle, Rejection, StructuredValue};
use vs_verify::{BackendCharacter, BackendResult, Recomputation, VerificationBackend};

/// Candidate programs used across test suites
pub mod fixtures {
    /// Integrates x^2 over [0, 1] with three steps and one plot
    pub const INTEGRAL: &str = "\
from sympy import symbols, integrate
x = symbols('x')
f = x**2
record_step(f, description='integrand')
F = integrate(f, x)
record_step(F, description='antiderivative')
value = integrate(f, (x, 0, 1))
record_step(value, description='evaluate from 0 to 1')
record_plot('function', f, x, (0, 1), 'y = x^2')
set_result(value)
";

    pub const TWO_PLUS_TWO: &str = "set_result(2 + 2)\n";

    /// Rejected: dynamic evaluation
    pub const EVAL: &str = "set_result(eval('2 + 2'))\n";

    /// Rejected: filesystem access
    pub const OPEN_FILE: &str = "data = open('/etc/passwd')\nset_result(1)\n";

    /// Runs until stopped
    pub const INFINITE_LOOP: &str = "n = 0\nwhile True:\n    n += 1\n";

    /// Fails at runtime
    pub const DIVIDE_BY_ZERO: &str = "set_result(1 / 0)\n";

    /// Finishes without a result
    pub const NO_RESULT: &str = "x = 2\nrecord_step(x)\n";
}

pub fn integral_problem() -> ProblemStatement {
    ProblemStatement::new("\\int_0^1 x^2 \\, dx").with_text("integrate x^2 from 0 to 1")
}

/// Interpreter that always returns the same understanding
#[derive(Debug, Clone)]
pub struct FixedInterpreter(pub Understanding);

impl Default for FixedInterpreter {
    fn default() -> Self {
        Self(Understanding::new("calculus", "definite integral"))
    }
}

#[async_trait]
impl ProblemInterpreter for FixedInterpreter {
    async fn understand(&self, _problem: &ProblemStatement) -> CollaboratorResult<Understanding> {
        Ok(self.0.clone())
    }
}

/// Generator that hands out scripted programs in order
///
/// Once the script runs out it keeps returning the last program. Every
/// request is recorded for later inspection.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(programs.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Feedback received by each call, in call order
    pub fn feedback(&self) -> Vec<Option<Rejection>> {
        self.requests.lock().iter().map(|r| r.feedback.clone()).collect()
    }
}

#[async_trait]
impl CodeGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> CollaboratorResult<CandidateSource> {
        self.requests.lock().push(request.clone());
        let next = self.script.lock().pop_front();
        let program = match next {
            Some(program) => {
                *self.last.lock() = Some(program.clone());
                program
            }
            None => self
                .last
                .lock()
                .clone()
                .ok_or_else(|| CollaboratorError::Failed("script is empty".into()))?,
        };
        Ok(CandidateSource::new(program))
    }
}

/// Explainer that narrates each step's description
#[derive(Debug, Default)]
pub struct EchoExplainer;

#[async_trait]
impl StepExplainer for EchoExplainer {
    async fn explain(&self, request: &ExplanationRequest) -> CollaboratorResult<Explanation> {
        Ok(Explanation {
            summary: format!("The answer is {}", request.result_latex),
            steps: request
                .steps
                .iter()
                .map(|s| s.description.clone().unwrap_or_else(|| s.value.to_text()))
                .collect(),
            fallback: false,
        })
    }
}

/// Renderer producing one placeholder figure per plot
#[derive(Debug, Default)]
pub struct CountingRenderer {
    calls: AtomicUsize,
}

impl CountingRenderer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlotRenderer for CountingRenderer {
    async fn render(&self, plots: &[PlotHandle]) -> CollaboratorResult<Vec<Visualization>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(plots
            .iter()
            .map(|plot| Visualization {
                plot: plot.index,
                title: plot.title.clone(),
                figure: serde_json::json!({ "kind": plot.kind, "data": plot.data.to_text() }),
            })
            .collect())
    }
}

/// Collaborator that is never reachable
#[derive(Debug, Default)]
pub struct Unreachable;

#[async_trait]
impl ProblemInterpreter for Unreachable {
    async fn understand(&self, _problem: &ProblemStatement) -> CollaboratorResult<Understanding> {
        Err(CollaboratorError::Unavailable("interpreter offline".into()))
    }
}

#[async_trait]
impl StepExplainer for Unreachable {
    async fn explain(&self, _request: &ExplanationRequest) -> CollaboratorResult<Explanation> {
        Err(CollaboratorError::Unavailable("explainer offline".into()))
    }
}

#[async_trait]
impl PlotRenderer for Unreachable {
    async fn render(&self, _plots: &[PlotHandle]) -> CollaboratorResult<Vec<Visualization>> {
        Err(CollaboratorError::Unavailable("renderer offline".into()))
    }
}

/// Interpreter that never answers
#[derive(Debug, Default)]
pub struct Stalled;

#[async_trait]
impl ProblemInterpreter for Stalled {
    async fn understand(&self, _problem: &ProblemStatement) -> CollaboratorResult<Understanding> {
        std::future::pending().await
    }
}

/// Working collaborators around `generator`
pub fn collaborators(generator: Arc<ScriptedGenerator>) -> Collaborators {
    Collaborators::new(
        Arc::new(FixedInterpreter::default()),
        generator,
        Arc::new(EchoExplainer),
        Arc::new(CountingRenderer::default()),
    )
}

/// Backend that answers with a fixed float after an optional delay
#[derive(Debug, Clone)]
pub struct FixedBackend {
    pub name: String,
    pub value: f64,
    pub delay: Duration,
}

impl FixedBackend {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl VerificationBackend for FixedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> &str {
        "fixed value"
    }

    fn character(&self) -> BackendCharacter {
        BackendCharacter::NumericFloat
    }

    async fn recompute(
        &self,
        _request: &Recomputation,
        _cancel: &CancellationFlag,
    ) -> BackendResult<StructuredValue> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(StructuredValue::Expression(Expr::Num(Number::Float(self.value))))
    }
}

/// Install a test subscriber once; later calls are no-ops
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
