//! Client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffConfig;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stable identifier reported to the collector.
    pub client_id: String,
    /// Collector endpoint settings.
    pub server: ServerConfig,
    /// Durable queue settings.
    pub queue: QueueConfig,
    /// Sampling settings.
    pub poll: PollConfig,
    /// Retry backoff settings.
    pub backoff: BackoffSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: "sensey-client".to_string(),
            server: ServerConfig::default(),
            queue: QueueConfig::default(),
            poll: PollConfig::default(),
            backoff: BackoffSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.client_id.is_empty() {
            errors.push(ValidationError {
                field: "client_id".to_string(),
                message: "client id cannot be empty".to_string(),
            });
        } else if self.client_id.contains(['/', '\\']) {
            errors.push(ValidationError {
                field: "client_id".to_string(),
                message: "client id cannot contain path separators".to_string(),
            });
        }

        if !self.server.base_url.starts_with("http://") && !self.server.base_url.starts_with("https://") {
            errors.push(ValidationError {
                field: "server.base_url".to_string(),
                message: format!("'{}' is not an http(s) URL", self.server.base_url),
            });
        }

        if self.queue.capacity == 0 {
            errors.push(ValidationError {
                field: "queue.capacity".to_string(),
                message: "capacity must be at least 1".to_string(),
            });
        }

        if self.poll.interval_secs == 0 {
            errors.push(ValidationError {
                field: "poll.interval_secs".to_string(),
                message: "interval must be at least 1 second".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Collector endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the collector (e.g., "http://127.0.0.1:8080").
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Durable queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Path to the queue journal file.
    pub journal_path: PathBuf,
    /// Maximum queued readings before the oldest is evicted.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            journal_path: PathBuf::from("sensey-queue.journal"),
            capacity: 10_000,
        }
    }
}

/// Sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between samples.
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Retry backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    /// Delay after the first failure, in seconds.
    pub initial_delay_secs: u64,
    /// Upper bound on the retry delay, in seconds.
    pub max_delay_secs: u64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: 1,
            max_delay_secs: 60,
        }
    }
}

impl From<&BackoffSettings> for BackoffConfig {
    fn from(settings: &BackoffSettings) -> Self {
        BackoffConfig {
            initial_delay: Duration::from_secs(settings.initial_delay_secs),
            max_delay: Duration::from_secs(settings.max_delay_secs),
            ..Default::default()
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Configuration validation failed: {}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation failure.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}
