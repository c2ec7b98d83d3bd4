//! External collaborators
//!
//! Problem understanding, code generation, narration and plot rendering
//! live outside this crate. The orchestrator only sees these traits.

use crate::error::CollaboratorResult;
use crate::run::ProblemStatement;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vs_sandbox::{CandidateSource, PlotHandle, Rejection, StepRecord, StructuredValue};

/// What the understanding stage made of a problem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Understanding {
    /// Problem category, e.g. `calculus` or `linear_algebra`
    pub category: String,
    /// One-line description of what is asked
    pub description: String,
}

impl Understanding {
    #[must_use]
    pub fn new(category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            description: description.into(),
        }
    }
}

/// Input to one generation attempt
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub problem: ProblemStatement,
    pub understanding: Understanding,
    /// 1-based attempt number
    pub attempt: u32,
    /// Why the previous candidate was rejected
    pub feedback: Option<Rejection>,
}

/// Input to the explanation stage
#[derive(Debug, Clone)]
pub struct ExplanationRequest {
    pub problem: ProblemStatement,
    pub steps: Vec<StepRecord>,
    pub result: StructuredValue,
    pub result_latex: String,
}

/// Narrated solution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    /// Overall narrative
    pub summary: String,
    /// One line per step, in step order
    pub steps: Vec<String>,
    /// Built locally because the explainer failed
    #[serde(default)]
    pub fallback: bool,
}

impl Explanation {
    /// Raw step-by-step rendering used when the explainer fails
    #[must_use]
    pub fn raw(steps: &[StepRecord], result_latex: &str) -> Self {
        let lines = steps
            .iter()
            .map(|step| {
                let rendered = step.latex.clone().unwrap_or_else(|| step.value.to_latex());
                match &step.description {
                    Some(description) => format!("Step {}: {description}: {rendered}", step.index + 1),
                    None => format!("Step {}: {rendered}", step.index + 1),
                }
            })
            .collect();
        Self {
            summary: format!("Result: {result_latex}"),
            steps: lines,
            fallback: true,
        }
    }
}

/// A rendered plot, opaque to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    /// Index of the [`PlotHandle`] it renders
    pub plot: usize,
    pub title: Option<String>,
    /// Renderer-specific figure description
    pub figure: serde_json::Value,
}

/// Understanding stage
#[async_trait]
pub trait ProblemInterpreter: Send + Sync {
    async fn understand(&self, problem: &ProblemStatement) -> CollaboratorResult<Understanding>;
}

/// Code generation stage
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Propose a candidate program for `request`
    ///
    /// On a regeneration `request.feedback` carries the rejection of the
    /// previous attempt.
    async fn generate(&self, request: &GenerationRequest) -> CollaboratorResult<CandidateSource>;
}

/// Explanation stage
#[async_trait]
pub trait StepExplainer: Send + Sync {
    async fn explain(&self, request: &ExplanationRequest) -> CollaboratorResult<Explanation>;
}

/// Visualization stage
#[async_trait]
pub trait PlotRenderer: Send + Sync {
    async fn render(&self, plots: &[PlotHandle]) -> CollaboratorResult<Vec<Visualization>>;
}

/// The four collaborators one orchestrator talks to
#[derive(Clone)]
pub struct Collaborators {
    pub interpreter: Arc<dyn ProblemInterpreter>,
    pub generator: Arc<dyn CodeGenerator>,
    pub explainer: Arc<dyn StepExplainer>,
    pub renderer: Arc<dyn PlotRenderer>,
}

impl Collaborators {
    /// Bundle the collaborators
    #[must_use]
    pub fn new(
        interpreter: Arc<dyn ProblemInterpreter>,
        generator: Arc<dyn CodeGenerator>,
        explainer: Arc<dyn StepExplainer>,
        renderer: Arc<dyn PlotRenderer>,
    ) -> Self {
        Self {
            interpreter,
            generator,
            explainer,
            renderer,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vs_math::Expr;

    #[test]
    fn raw_explanation_keeps_step_order() {
        let steps = vec![
            StepRecord {
                index: 0,
                value: StructuredValue::Expression(Expr::symbol("x")),
                latex: Some("x^{3}/3".into()),
                description: Some("antiderivative".into()),
            },
            StepRecord {
                index: 1,
                value: StructuredValue::Expression(Expr::rational(1, 3).unwrap()),
                latex: None,
                description: None,
            },
        ];
        let explanation = Explanation::raw(&steps, "\\frac{1}{3}");
        assert!(explanation.fallback);
        assert_eq!(explanation.summary, "Result: \\frac{1}{3}");
        assert_eq!(
            explanation.steps,
            vec![
                "Step 1: antiderivative: x^{3}/3".to_string(),
                "Step 2: \\frac{1}{3}".to_string(),
            ]
        );
    }
}
