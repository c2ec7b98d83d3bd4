//! Error type for expression algebra

/// Failure of a mathematical operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MathError {
    /// Division (or a negative power) of zero
    #[error("division by zero")]
    DivisionByZero,

    /// Argument outside the function's real domain
    #[error("math domain error: {0}")]
    Domain(String),

    /// Result not representable
    #[error("numeric overflow: {0}")]
    Overflow(String),

    /// Exact power too large to evaluate
    #[error("exponent {0} exceeds the exact evaluation limit")]
    ExponentTooLarge(String),

    /// Operation outside what the algebra implements
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Matrix or sequence dimensions disagree
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// Iterative method failed to settle
    #[error("did not converge: {0}")]
    NoConvergence(String),

    /// Numeric evaluation met an unbound symbol
    #[error("free symbol '{0}' has no numeric value")]
    FreeSymbol(String),
}

impl MathError {
    /// Short Python-style class name used in runtime error messages
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::DivisionByZero => "ZeroDivisionError",
            Self::Domain(_) | Self::FreeSymbol(_) => "ValueError",
            Self::Overflow(_) | Self::ExponentTooLarge(_) => "OverflowError",
            Self::Unsupported(_) | Self::NoConvergence(_) => "NotImplementedError",
            Self::Shape(_) => "ShapeError",
        }
    }
}

/// Result alias for math operations
pub type MathResult<T> = Result<T, MathError>;
