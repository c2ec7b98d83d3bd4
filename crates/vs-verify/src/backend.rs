//! Verification backends
//!
//! A backend recomputes a validated candidate independently of the primary
//! run. The built-in backends rerun the same program in the sandbox under a
//! different numeric mode, so a quirk of one number model cannot silently
//! become the answer.

use crate::error::BackendResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use vs_math::NumericMode;
use vs_sandbox::{
    CancellationFlag, CapabilityPolicy, ExecutionLimits, ExecutionOutcome, SandboxRunner,
    StructuredValue, ValidatedSource,
};

/// Numeric nature of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendCharacter {
    /// Exact rationals and symbolic algebra
    SymbolicExact,
    /// IEEE double precision numerics
    NumericFloat,
    /// Big-rational arithmetic rounded to a fixed number of digits
    ArbitraryPrecision,
}

impl fmt::Display for BackendCharacter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SymbolicExact => "symbolic_exact",
            Self::NumericFloat => "numeric_float",
            Self::ArbitraryPrecision => "arbitrary_precision",
        })
    }
}

/// Input to one recomputation
#[derive(Debug, Clone)]
pub struct Recomputation {
    /// Candidate that produced the primary result
    pub source: ValidatedSource,
    /// Canonical problem text, for backends that work from the statement
    pub statement: Option<String>,
}

impl Recomputation {
    /// Create a recomputation of `source`
    #[must_use]
    pub fn new(source: ValidatedSource) -> Self {
        Self {
            source,
            statement: None,
        }
    }

    #[must_use]
    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }
}

/// Independent engine the verifier consults
///
/// Implementations must be cancel-safe: the verifier drops the future when
/// the per-backend timeout passes or the run is cancelled.
#[async_trait]
pub trait VerificationBackend: Send + Sync {
    /// Stable identifier used in reports
    fn name(&self) -> &str;

    /// Human-readable engine label
    fn label(&self) -> &str;

    fn character(&self) -> BackendCharacter;

    /// Recompute the result of `request`
    async fn recompute(
        &self,
        request: &Recomputation,
        cancel: &CancellationFlag,
    ) -> BackendResult<StructuredValue>;
}

/// Backend that reruns the candidate in the sandbox under its own mode
#[derive(Debug, Clone)]
pub struct SandboxBackend {
    name: String,
    label: String,
    character: BackendCharacter,
    mode: NumericMode,
    runner: SandboxRunner,
}

impl SandboxBackend {
    /// Exact rational and symbolic recomputation
    #[must_use]
    pub fn symbolic(policy: Arc<CapabilityPolicy>, limits: ExecutionLimits) -> Self {
        Self {
            name: "symbolic-exact".into(),
            label: "symbolic engine".into(),
            character: BackendCharacter::SymbolicExact,
            mode: NumericMode::Exact,
            runner: SandboxRunner::new(policy, limits),
        }
    }

    /// Double precision recomputation
    #[must_use]
    pub fn numeric(policy: Arc<CapabilityPolicy>, limits: ExecutionLimits) -> Self {
        Self {
            name: "numeric-float".into(),
            label: "numerical engine".into(),
            character: BackendCharacter::NumericFloat,
            mode: NumericMode::Float,
            runner: SandboxRunner::new(policy, limits),
        }
    }

    /// Recomputation keeping `digits` decimal digits
    #[must_use]
    pub fn arbitrary_precision(
        policy: Arc<CapabilityPolicy>,
        limits: ExecutionLimits,
        digits: u32,
    ) -> Self {
        Self {
            name: "arbitrary-precision".into(),
            label: "arbitrary-precision engine".into(),
            character: BackendCharacter::ArbitraryPrecision,
            mode: NumericMode::Precise { digits },
            runner: SandboxRunner::new(policy, limits),
        }
    }

    #[must_use]
    pub fn mode(&self) -> NumericMode {
        self.mode
    }
}

#[async_trait]
impl VerificationBackend for SandboxBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn character(&self) -> BackendCharacter {
        self.character
    }

    async fn recompute(
        &self,
        request: &Recomputation,
        cancel: &CancellationFlag,
    ) -> BackendResult<StructuredValue> {
        match self.runner.run(&request.source, self.mode, cancel).await {
            ExecutionOutcome::Success(success) => Ok(success.result),
            ExecutionOutcome::Failure(failure) => Err(failure.into()),
        }
    }
}

/// The three built-in backends in canonical order
#[must_use]
pub fn default_backends(
    policy: &Arc<CapabilityPolicy>,
    limits: &ExecutionLimits,
    digits: u32,
) -> Vec<Arc<dyn VerificationBackend>> {
    vec![
        Arc::new(SandboxBackend::symbolic(Arc::clone(policy), limits.clone())),
        Arc::new(SandboxBackend::numeric(Arc::clone(policy), limits.clone())),
        Arc::new(SandboxBackend::arbitrary_precision(
            Arc::clone(policy),
            limits.clone(),
            digits,
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn canonical_order() {
        let backends = default_backends(
            &CapabilityPolicy::shared_mathematics(),
            &ExecutionLimits::default(),
            50,
        );
        let names: Vec<&str> = backends.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["symbolic-exact", "numeric-float", "arbitrary-precision"]);
        assert_eq!(backends[2].character(), BackendCharacter::ArbitraryPrecision);
    }
}
