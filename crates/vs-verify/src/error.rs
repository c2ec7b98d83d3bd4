//! Error types for verification backends
//!
//! A backend error never fails a solve run. The verifier records it as a
//! non-matching verdict and keeps going.

use std::time::Duration;
use vs_sandbox::{ExecutionFailure, FailureKind};

/// Why a backend produced no value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The recomputation ran and failed
    #[error("recomputation failed ({kind}): {message}")]
    Execution {
        /// Failure kind reported by the sandbox
        kind: FailureKind,
        /// Failure message, as reported
        message: String,
    },

    /// No value within the per-backend time budget
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),

    /// The run was cancelled by its caller
    #[error("backend cancelled")]
    Cancelled,

    /// Backend could not be reached or its task died
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Check if a later attempt could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

impl From<ExecutionFailure> for BackendError {
    fn from(failure: ExecutionFailure) -> Self {
        match failure.kind {
            FailureKind::Cancelled => Self::Cancelled,
            kind => Self::Execution {
                kind,
                message: failure.message,
            },
        }
    }
}

/// Result alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(BackendError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(BackendError::Unavailable("gone".into()).is_retryable());
        assert!(!BackendError::Cancelled.is_retryable());
    }

    #[test]
    fn sandbox_failures_convert() {
        let err = BackendError::from(ExecutionFailure {
            kind: FailureKind::Runtime,
            message: "line 3: ZeroDivisionError: division by zero".into(),
        });
        assert!(err.to_string().contains("runtime"));
        let cancelled = BackendError::from(ExecutionFailure {
            kind: FailureKind::Cancelled,
            message: String::new(),
        });
        assert_eq!(cancelled, BackendError::Cancelled);
    }
}
