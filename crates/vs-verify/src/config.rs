//! Verifier configuration

use crate::comparator::Tolerance;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for [`crate::Verifier::from_config`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Upper bound on each backend's recomputation
    #[serde(with = "vs_sandbox::limits::secs_f64")]
    pub backend_timeout: Duration,
    pub tolerance: Tolerance,
    /// Digits kept by the arbitrary-precision backend
    pub precise_digits: u32,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(10),
            tolerance: Tolerance::default(),
            precise_digits: 50,
        }
    }
}

impl VerifierConfig {
    #[must_use]
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn with_precise_digits(mut self, digits: u32) -> Self {
        self.precise_digits = digits;
        self
    }

    /// Problems that make the configuration unusable
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.backend_timeout.is_zero() {
            out.push("verifier.backend_timeout must be positive".to_string());
        }
        let Tolerance { relative, absolute } = self.tolerance;
        if !(relative.is_finite() && relative >= 0.0 && absolute.is_finite() && absolute >= 0.0) {
            out.push("verifier.tolerance bounds must be finite and non-negative".to_string());
        }
        if !(1..=1000).contains(&self.precise_digits) {
            out.push("verifier.precise_digits must be between 1 and 1000".to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_usable() {
        assert!(VerifierConfig::default().problems().is_empty());
    }

    #[test]
    fn bad_values_are_reported() {
        let config = VerifierConfig::default()
            .with_backend_timeout(Duration::ZERO)
            .with_precise_digits(0);
        assert_eq!(config.problems().len(), 2);
    }
}
