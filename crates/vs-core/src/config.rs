//! Pipeline configuration
//!
//! Every section has defaults, so an empty document is a valid
//! configuration. A missing `[policy]` section selects the built-in
//! mathematics policy.
//!
//! ```toml
//! [sandbox]
//! timeout = 5.0
//! max_operations = 5000000
//!
//! [verifier]
//! backend_timeout = 10.0
//! precise_digits = 50
//!
//! [verifier.tolerance]
//! relative = 1e-9
//! absolute = 1e-12
//!
//! [events]
//! snippet_chars = 600
//!
//! [telemetry]
//! filter = "info,vs_sandbox=debug"
//! json = false
//! ```

use crate::error::ConfigError;
use crate::events::EventConfig;
use crate::telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use vs_sandbox::{CapabilityPolicy, ExecutionLimits};
use vs_verify::{Tolerance, VerifierConfig};

/// Configuration for [`crate::PipelineOrchestrator`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Limits for primary execution and sandbox-backed verification
    pub sandbox: ExecutionLimits,
    pub verifier: VerifierConfig,
    /// Custom capability policy; `None` selects the built-in one
    pub policy: Option<CapabilityPolicy>,
    pub events: EventConfig,
    pub telemetry: TelemetryConfig,
    /// Cached validation verdicts
    pub validation_cache: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sandbox: ExecutionLimits::default(),
            verifier: VerifierConfig::default(),
            policy: None,
            events: EventConfig::default(),
            telemetry: TelemetryConfig::default(),
            validation_cache: 1_024,
        }
    }
}

impl PipelineConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed documents and the
    /// errors of [`Self::validate`] for unusable values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// as [`Self::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check values that parse but cannot be used
    ///
    /// # Errors
    /// Returns [`ConfigError::Policy`] for an inconsistent custom policy and
    /// [`ConfigError::Invalid`] listing every other problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(policy) = &self.policy {
            policy.check()?;
        }
        let mut problems = Vec::new();
        if self.sandbox.timeout.is_zero() {
            problems.push("sandbox.timeout must be positive".to_string());
        }
        if self.sandbox.max_operations == 0 {
            problems.push("sandbox.max_operations must be positive".to_string());
        }
        problems.extend(self.verifier.problems());
        if self.validation_cache == 0 {
            problems.push("validation_cache must be positive".to_string());
        }
        if self.events.incident_capacity == 0 {
            problems.push("events.incident_capacity must be positive".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Policy shared by the validator, the runner and the backends
    #[must_use]
    pub fn capability_policy(&self) -> Arc<CapabilityPolicy> {
        self.policy
            .clone()
            .map_or_else(CapabilityPolicy::shared_mathematics, Arc::new)
    }

    #[must_use]
    pub fn with_sandbox_timeout(mut self, timeout: Duration) -> Self {
        self.sandbox.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.sandbox = limits;
        self
    }

    #[must_use]
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.verifier.backend_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.verifier.tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: CapabilityPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventConfig) -> Self {
        self.events = events;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::new());
        assert_eq!(config.sandbox.timeout, Duration::from_secs(5));
        assert!(Arc::ptr_eq(
            &config.capability_policy(),
            &CapabilityPolicy::shared_mathematics()
        ));
    }

    #[test]
    fn sections_override_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
[sandbox]
timeout = 2.5

[verifier]
precise_digits = 30

[verifier.tolerance]
relative = 1e-6
absolute = 0.0

[events]
step_events = false

[telemetry]
json = true
"#,
        )
        .unwrap();
        assert_eq!(config.sandbox.timeout, Duration::from_millis(2500));
        assert_eq!(config.verifier.precise_digits, 30);
        assert_eq!(config.verifier.tolerance, Tolerance::relative(1e-6));
        assert!(!config.events.step_events);
        assert!(config.telemetry.json);
    }

    #[test]
    fn unusable_values_are_listed() {
        let err = PipelineConfig::from_toml_str("[sandbox]\ntimeout = 0.0\n[events]\nincident_capacity = 0\n")
            .unwrap_err();
        match err {
            ConfigError::Invalid(problems) => assert_eq!(problems.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            PipelineConfig::from_toml_str("[sandbox"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn contradictory_policy_is_refused() {
        let err = PipelineConfig::from_toml_str(
            "[policy]\nbuiltins = [\"open\"]\n[policy.denied]\nopen = \"filesystem_access\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Policy(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = PipelineConfig::from_file("/nonexistent/verisolve.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/verisolve.toml"));
    }
}
