//! Configuration loading for the Tandem node.
//!
//! The node reads `tandem-config.yaml` from the working directory. Every
//! section and field has a default, so a missing file or a partial file is
//! fine.
//!
//! ```yaml
//! backend:
//!   dragonfly_url: "redis://localhost:6379"
//! transport:
//!   nats_url: "nats://localhost:4222"
//!   subject_prefix: "tandem"
//! timers:
//!   queue_key: "timeouts"
//!   sweep_interval_ms: 60000
//! logging:
//!   level: "info"
//! ```

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level node configuration, mirroring `tandem-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TandemConfig {
    /// Durable backend connection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Client transport.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Timer queue and driver.
    #[serde(default)]
    pub timers: TimersConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TandemConfig {
    /// Load configuration from a YAML file.
    ///
    /// Environment variables override connection URLs:
    /// - `DRAGONFLY_URL` overrides `backend.dragonfly_url`
    /// - `NATS_URL` overrides `transport.nats_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override connection URLs with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.backend.dragonfly_url = val;
        }
        if let Ok(val) = std::env::var("NATS_URL") {
            self.transport.nats_url = val;
        }
    }
}

/// Durable backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendConfig {
    /// Dragonfly (Redis-compatible) URL.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            dragonfly_url: default_dragonfly_url(),
        }
    }
}

/// Client transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransportConfig {
    /// NATS messaging URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// First token of every gateway subject.
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

/// Timer queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimersConfig {
    /// Sorted-set key of the timer queue; bodies live under `{key}:events`.
    #[serde(default = "default_queue_key")]
    pub queue_key: String,

    /// Milliseconds between sweeps.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            queue_key: default_queue_key(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_subject_prefix() -> String {
    "tandem".to_owned()
}

fn default_queue_key() -> String {
    tandem_timers::DEFAULT_QUEUE_KEY.to_owned()
}

const fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TandemConfig::default();
        assert_eq!(config.backend.dragonfly_url, "redis://localhost:6379");
        assert_eq!(config.transport.subject_prefix, "tandem");
        assert_eq!(config.timers.queue_key, "timeouts");
        assert_eq!(config.timers.sweep_interval_ms, 60_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_partial_yaml_fills_defaults() {
        let yaml = r#"
transport:
  subject_prefix: "game"
timers:
  sweep_interval_ms: 5000
"#;
        let config = TandemConfig::parse(yaml).unwrap_or_default();
        assert_eq!(config.transport.subject_prefix, "game");
        assert_eq!(config.timers.sweep_interval_ms, 5_000);
        assert_eq!(config.timers.queue_key, "timeouts");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_empty_document() {
        let config = serde_yml::from_str::<TandemConfig>("{}").unwrap_or_else(|_| TandemConfig {
            logging: LoggingConfig {
                level: "wrong".to_owned(),
            },
            ..TandemConfig::default()
        });
        assert_eq!(config, TandemConfig::default());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = TandemConfig::parse("timers: [not, a, map");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = TandemConfig::from_file(Path::new("/nonexistent/tandem-config.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
