//! Verisolve Verify - cross-engine recomputation
//!
//! Checks a primary result by recomputing it on independent backends:
//!
//! - **[`VerificationBackend`]**: one engine; the built-in
//!   [`SandboxBackend`]s rerun the validated program under exact, double
//!   and arbitrary-precision arithmetic
//! - **[`Comparator`]**: kind-aware matching within a [`Tolerance`]
//! - **[`Verifier`]**: runs every backend concurrently, each under its own
//!   timeout, and collects a [`VerificationReport`]
//!
//! Disagreement is reported, never resolved. The report is informational
//! and does not pick a winner.

pub mod backend;
pub mod comparator;
pub mod config;
pub mod error;
pub mod report;
pub mod verifier;

pub use backend::{
    default_backends, BackendCharacter, Recomputation, SandboxBackend, VerificationBackend,
};
pub use comparator::{Comparator, Tolerance};
pub use config::VerifierConfig;
pub use error::{BackendError, BackendResult};
pub use report::{BackendVerdict, Consensus, VerificationReport};
pub use verifier::Verifier;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
