//! Execution outcomes
//!
//! What a sandbox run hands back to the pipeline:
//! - [`StructuredValue`]: host-side data extracted from interpreter values
//! - [`StepRecord`] / [`PlotHandle`]: ordered trace of the solution
//! - [`ExecutionOutcome`]: success with result and trace, or a typed failure

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use vs_math::{Expr, Matrix};

/// Result value in a form that outlives the interpreter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StructuredValue {
    /// `None`
    Null,
    Boolean(bool),
    /// Number or symbolic expression
    Expression(Expr),
    /// `lhs == rhs` as an equation
    Equation { lhs: Expr, rhs: Expr },
    Text(String),
    /// List or tuple
    Sequence(Vec<StructuredValue>),
    /// Dictionary in insertion order
    Mapping(Vec<(StructuredValue, StructuredValue)>),
    Matrix(Matrix),
}

impl StructuredValue {
    /// Plain-text rendering
    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// LaTeX rendering
    #[must_use]
    pub fn to_latex(&self) -> String {
        match self {
            Self::Null => "\\text{None}".to_string(),
            Self::Boolean(b) => format!("\\text{{{}}}", if *b { "True" } else { "False" }),
            Self::Expression(e) => e.to_latex(),
            Self::Equation { lhs, rhs } => format!("{} = {}", lhs.to_latex(), rhs.to_latex()),
            Self::Text(t) => format!("\\text{{{t}}}"),
            Self::Sequence(items) => {
                let inner: Vec<String> = items.iter().map(Self::to_latex).collect();
                format!("\\left[ {}\\right]", inner.join(", "))
            }
            Self::Mapping(pairs) => {
                let inner: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{} : {}", k.to_latex(), v.to_latex()))
                    .collect();
                format!("\\left\\{{ {}\\right\\}}", inner.join(", "))
            }
            Self::Matrix(m) => m.to_latex(),
        }
    }

    /// Short kind label used in logs and events
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Expression(_) => "expression",
            Self::Equation { .. } => "equation",
            Self::Text(_) => "text",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
            Self::Matrix(_) => "matrix",
        }
    }
}

impl fmt::Display for StructuredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Boolean(b) => f.write_str(if *b { "True" } else { "False" }),
            Self::Expression(e) => write!(f, "{e}"),
            Self::Equation { lhs, rhs } => write!(f, "Eq({lhs}, {rhs})"),
            Self::Text(t) => f.write_str(t),
            Self::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Mapping(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Matrix(m) => write!(f, "{m}"),
        }
    }
}

/// One intermediate value of the solution, in production order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position in the trace, contiguous from 0
    pub index: usize,
    pub value: StructuredValue,
    /// Rendering supplied by the program
    pub latex: Option<String>,
    /// Short description supplied by the program
    pub description: Option<String>,
}

/// Plot requested by the program; rendering happens elsewhere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotHandle {
    pub index: usize,
    /// Plot kind, e.g. `function` or `scatter`
    pub kind: String,
    /// Plotted expression or data
    pub data: StructuredValue,
    pub variable: Option<String>,
    pub domain: Option<(f64, f64)>,
    pub title: Option<String>,
}

/// Why a run produced no usable result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Deadline passed or operation budget exhausted
    Timeout,
    /// Uncaught error while running
    Runtime,
    /// Program finished without setting a result
    MissingResult,
    /// Caller cancelled the run
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::Runtime => "runtime",
            Self::MissingResult => "missing_result",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSuccess {
    pub result: StructuredValue,
    /// Program-supplied LaTeX, or rendered from the result
    pub result_latex: String,
    pub steps: Vec<StepRecord>,
    pub plots: Vec<PlotHandle>,
    /// Captured `print` output
    pub stdout: String,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    /// Interpreter operations consumed
    pub operations: u64,
}

/// Failed run; partial steps are discarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of one sandbox run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success(ExecutionSuccess),
    Failure(ExecutionFailure),
}

impl ExecutionOutcome {
    /// Create failure outcome
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure(ExecutionFailure {
            kind,
            message: message.into(),
        })
    }

    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Success payload, if any
    #[must_use]
    pub fn success(&self) -> Option<&ExecutionSuccess> {
        match self {
            Self::Success(s) => Some(s),
            Self::Failure(_) => None,
        }
    }

    /// Failure payload, if any
    #[must_use]
    pub fn failure_info(&self) -> Option<&ExecutionFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_nested_values() {
        let value = StructuredValue::Sequence(vec![
            StructuredValue::Expression(Expr::rational(1, 3).unwrap()),
            StructuredValue::Text("done".into()),
            StructuredValue::Boolean(true),
        ]);
        assert_eq!(value.to_string(), "[1/3, done, True]");
        assert_eq!(
            StructuredValue::Expression(Expr::rational(1, 3).unwrap()).to_latex(),
            "\\frac{1}{3}"
        );
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = ExecutionOutcome::failure(FailureKind::Timeout, "deadline");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["kind"], "timeout");
    }
}
