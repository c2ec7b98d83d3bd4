//! Error types for the sandbox
//!
//! Provides error handling for:
//! - Loading capability policies from configuration
//! - Failures raised while interpreting a candidate program

use crate::outcome::FailureKind;
use vs_math::MathError;

/// Errors loading or checking a capability policy
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Policy document is not valid TOML for the schema
    #[error("invalid policy document: {0}")]
    Parse(#[from] toml::de::Error),

    /// A name is both allowed and denied
    #[error("'{0}' is listed as both allowed and denied")]
    Contradiction(String),

    /// A module rule names a module path that is empty or malformed
    #[error("invalid module path: '{0}'")]
    InvalidModule(String),
}

/// Errors raised while a candidate program runs
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// Unbound name
    #[error("NameError: name '{0}' is not defined")]
    Name(String),

    /// Operation applied to a value of the wrong type
    #[error("TypeError: {0}")]
    Type(String),

    /// Right type, wrong value
    #[error("ValueError: {0}")]
    Value(String),

    /// Sequence index out of range
    #[error("IndexError: {0}")]
    Index(String),

    /// Missing mapping key
    #[error("KeyError: {0}")]
    Key(String),

    /// Missing attribute or method
    #[error("AttributeError: {0}")]
    Attribute(String),

    /// Import the policy does not permit at run time
    #[error("ImportError: {0}")]
    Import(String),

    /// Failure inside the expression algebra
    #[error("{name}: {0}", name = .0.class_name())]
    Math(#[from] MathError),

    /// `set_result` called more than once
    #[error("RuntimeError: the result was already set")]
    ResultAlreadySet,

    /// Nesting of calls exceeded the configured depth
    #[error("RecursionError: maximum call depth of {0} exceeded")]
    Recursion(usize),

    /// A collection, exponent or output grew past its limit
    #[error("ResourceError: {0}")]
    Limit(String),

    /// The operation budget ran out
    #[error("operation budget of {0} exhausted")]
    BudgetExhausted(u64),

    /// The wall-clock deadline passed
    #[error("execution exceeded its deadline")]
    Deadline,

    /// The run was cancelled by its caller
    #[error("execution was cancelled")]
    Cancelled,
}

impl RuntimeError {
    /// Create type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// Create value error
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::Value(message.into())
    }

    /// Create limit error
    pub fn limit(message: impl Into<String>) -> Self {
        Self::Limit(message.into())
    }

    /// Failure kind reported in the execution outcome
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::BudgetExhausted(_) | Self::Deadline => FailureKind::Timeout,
            Self::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Runtime,
        }
    }
}

/// Result alias for interpreter operations
pub type RunResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn math_errors_keep_class_name() {
        let err: RuntimeError = MathError::DivisionByZero.into();
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
    }

    #[test]
    fn budget_counts_as_timeout() {
        assert_eq!(RuntimeError::BudgetExhausted(10).failure_kind(), FailureKind::Timeout);
        assert_eq!(RuntimeError::Deadline.failure_kind(), FailureKind::Timeout);
        assert_eq!(RuntimeError::Cancelled.failure_kind(), FailureKind::Cancelled);
        assert_eq!(RuntimeError::Name("x".into()).failure_kind(), FailureKind::Runtime);
    }
}
