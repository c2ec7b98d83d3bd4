//! Verisolve Sandbox - policy, validation and restricted execution
//!
//! Turns untrusted solver text into a structured, reproducible result:
//!
//! - **[`CapabilityPolicy`]**: declarative allow/deny rules for modules,
//!   module symbols and bare names
//! - **[`StaticValidator`]**: parses a [`CandidateSource`] and rejects the
//!   first construct the policy forbids; only it can mint a
//!   [`ValidatedSource`]
//! - **[`SandboxRunner`]**: executes a validated program in a fresh
//!   interpreter under [`ExecutionLimits`] and returns an
//!   [`ExecutionOutcome`]
//!
//! A program reports its work through three contract functions:
//! `record_step`, `record_plot` and `set_result`. Nothing else it does is
//! visible to the host.
//!
//! # Example
//!
//! ```rust,no_run
//! use vs_sandbox::{
//!     CancellationFlag, CandidateSource, CapabilityPolicy, ExecutionLimits, SandboxRunner,
//!     StaticValidator, ValidationVerdict,
//! };
//! use vs_math::NumericMode;
//!
//! # async fn demo() {
//! let policy = CapabilityPolicy::shared_mathematics();
//! let validator = StaticValidator::new(policy.clone());
//! let ValidationVerdict::Accepted(source) =
//!     validator.validate(&CandidateSource::new("set_result(2 + 2)"))
//! else {
//!     return;
//! };
//! let runner = SandboxRunner::new(policy, ExecutionLimits::default());
//! let outcome = runner
//!     .run(&source, NumericMode::Exact, &CancellationFlag::new())
//!     .await;
//! assert!(outcome.is_success());
//! # }
//! ```

mod ast;
pub mod cache;
pub mod error;
mod interpreter;
pub mod limits;
pub mod outcome;
mod parser;
pub mod policy;
pub mod runner;
pub mod validator;
mod value;

pub use ast::Location;
pub use cache::CachedValidator;
pub use error::{PolicyError, RunResult, RuntimeError};
pub use limits::{AbortReason, AbortSignal, ExecutionLimits, ResourceMeter};
pub use outcome::{
    ExecutionFailure, ExecutionOutcome, ExecutionSuccess, FailureKind, PlotHandle, StepRecord,
    StructuredValue,
};
pub use policy::{CapabilityPolicy, Decision, ModuleRule, ViolationKind};
pub use runner::{CancellationFlag, SandboxRunner};
pub use validator::{
    CandidateSource, Fingerprint, Rejection, StaticValidator, ValidatedSource, ValidationVerdict,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
