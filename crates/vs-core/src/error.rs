//! Error types for the solve pipeline
//!
//! Provides error handling for:
//! - Candidate rejection and primary execution failures
//! - External collaborator failures
//! - Illegal stage transitions
//! - Loading and validating configuration

use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use vs_sandbox::{ExecutionFailure, FailureKind, Location, PolicyError, Rejection, ViolationKind};

/// Why a solve run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineError {
    /// Every generated candidate was rejected by the validator
    #[error("candidate rejected: {violation} '{construct}' at {at}")]
    ValidationRejected {
        violation: ViolationKind,
        construct: String,
        at: Location,
    },

    /// Primary execution ran out of time or operations
    #[error("execution timed out: {message}")]
    Timeout { message: String },

    /// Primary execution raised an error
    #[error("execution failed: {message}")]
    Runtime { message: String },

    /// Primary execution finished without a result
    #[error("no result: {message}")]
    MissingResult { message: String },

    /// A collaborator the run cannot do without failed
    #[error("{stage} collaborator failed: {source}")]
    Collaborator {
        /// Stage the collaborator was serving
        stage: Stage,
        source: CollaboratorError,
    },

    /// The caller cancelled the run
    #[error("run cancelled")]
    Cancelled,

    /// The run task died before producing a response
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl PipelineError {
    /// Check if a fresh run of the same problem could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Internal { .. } => true,
            Self::Collaborator { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Offending construct, when the failure has one
    #[must_use]
    pub fn construct(&self) -> Option<&str> {
        match self {
            Self::ValidationRejected { construct, .. } => Some(construct),
            _ => None,
        }
    }
}

impl From<Rejection> for PipelineError {
    fn from(rejection: Rejection) -> Self {
        Self::ValidationRejected {
            violation: rejection.kind,
            construct: rejection.construct,
            at: rejection.at,
        }
    }
}

impl From<ExecutionFailure> for PipelineError {
    fn from(failure: ExecutionFailure) -> Self {
        let message = failure.message;
        match failure.kind {
            FailureKind::Timeout => Self::Timeout { message },
            FailureKind::Runtime => Self::Runtime { message },
            FailureKind::MissingResult => Self::MissingResult { message },
            FailureKind::Cancelled => Self::Cancelled,
        }
    }
}

impl From<TransitionError> for PipelineError {
    fn from(err: TransitionError) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}

/// Failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum CollaboratorError {
    /// Service could not be reached
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Service answered but could not do the work
    #[error("{0}")]
    Failed(String),
}

impl CollaboratorError {
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type for collaborator calls
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Attempted stage change the machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal stage transition {from} -> {to}")]
pub struct TransitionError {
    pub from: Stage,
    pub to: Stage,
}

/// Errors loading or validating [`crate::PipelineConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// Document is not valid TOML for the schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Embedded capability policy is inconsistent
    #[error("invalid capability policy: {0}")]
    Policy(#[from] PolicyError),

    /// Values that parse but cannot be used
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// Tracing subscriber could not be installed
    #[error("telemetry setup failed: {0}")]
    Telemetry(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn execution_failures_map_by_kind() {
        let failure = ExecutionFailure {
            kind: FailureKind::MissingResult,
            message: "set_result was never called".into(),
        };
        assert_eq!(
            PipelineError::from(failure),
            PipelineError::MissingResult {
                message: "set_result was never called".into()
            }
        );
        let cancelled = ExecutionFailure {
            kind: FailureKind::Cancelled,
            message: String::new(),
        };
        assert_eq!(PipelineError::from(cancelled), PipelineError::Cancelled);
    }

    #[test]
    fn rejection_keeps_construct() {
        let err = PipelineError::from(Rejection {
            kind: ViolationKind::DynamicEvaluation,
            construct: "eval".into(),
            at: Location { line: 3, column: 1 },
        });
        assert_eq!(err.construct(), Some("eval"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn retryable_classification() {
        assert!(PipelineError::Timeout { message: String::new() }.is_retryable());
        let err = PipelineError::Collaborator {
            stage: Stage::CodeGenerated,
            source: CollaboratorError::Unavailable("rate limited".into()),
        };
        assert!(err.is_retryable());
        assert!(!PipelineError::Cancelled.is_retryable());
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(PipelineError::Runtime {
            message: "ZeroDivisionError".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "runtime");
        assert_eq!(json["message"], "ZeroDivisionError");
    }
}
