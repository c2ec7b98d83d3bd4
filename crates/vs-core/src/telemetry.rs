//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over the configured filter when it is set.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit one JSON object per line instead of human-readable text
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.filter)
                .map_err(|err| ConfigError::Telemetry(format!("bad filter '{}': {err}", self.filter))),
        }
    }
}

/// Install the global tracing subscriber
///
/// # Errors
/// Returns [`ConfigError::Telemetry`] if the filter does not parse or a
/// global subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), ConfigError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| ConfigError::Telemetry(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_directives_are_reported() {
        let config = TelemetryConfig {
            filter: "vs_core=loudest".to_string(),
            json: false,
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(matches!(config.env_filter(), Err(ConfigError::Telemetry(_))));
        }
    }

    #[test]
    fn second_install_fails_cleanly() {
        let config = TelemetryConfig::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
