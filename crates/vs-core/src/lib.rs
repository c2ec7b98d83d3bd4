//! Verisolve Core - staged solve pipeline
//!
//! Wires the sandbox and the verifier into one request pipeline:
//!
//! - **[`PipelineOrchestrator`]**: drives a run through
//!   [`Stage`]s, calling external [`Collaborators`] for understanding,
//!   generation, narration and plots
//! - **[`ProgressEvent`]**: fire-and-forget progress stream for UIs
//! - **[`Incident`]**: broadcast feed of failures and mismatches for
//!   out-of-band consumers
//! - **[`PipelineConfig`]**: TOML configuration with defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use vs_core::{Collaborators, PipelineConfig, PipelineOrchestrator, ProblemStatement};
//!
//! # async fn demo(collaborators: Collaborators) -> Result<(), vs_core::ConfigError> {
//! let orchestrator = PipelineOrchestrator::new(PipelineConfig::new(), collaborators)?;
//! let response = orchestrator
//!     .solve(ProblemStatement::new("\\int_0^1 x^2 \\, dx"))
//!     .await;
//! if let Some(solution) = response.solution() {
//!     println!("{} ({})", solution.result_latex, solution.verification.tally());
//! }
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod incidents;
pub mod orchestrator;
pub mod response;
pub mod run;
pub mod stage;
pub mod telemetry;

pub use collaborators::{
    CodeGenerator, Collaborators, Explanation, ExplanationRequest, GenerationRequest,
    PlotRenderer, ProblemInterpreter, StepExplainer, Understanding, Visualization,
};
pub use config::PipelineConfig;
pub use error::{CollaboratorError, CollaboratorResult, ConfigError, PipelineError, TransitionError};
pub use events::{EventConfig, EventPayload, ProgressEvent};
pub use incidents::Incident;
pub use orchestrator::{PipelineOrchestrator, SolveHandle, MAX_GENERATION_ATTEMPTS};
pub use response::{FailureReport, Solution, SolveResponse};
pub use run::{ProblemStatement, RunId, SolveRun};
pub use stage::{allowed_transitions, validate_transition, Stage};
pub use telemetry::{init_tracing, TelemetryConfig};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
