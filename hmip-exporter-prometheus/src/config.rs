//! Configuration for the HomematicIP exporter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use hmip_common::config::{CloudConfig, LoggingConfig};

/// Default location of the exporter configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hmip-exporter/config.json5";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Cloud access point connection settings.
    #[serde(default)]
    pub cloud: CloudConfig,

    /// Prometheus HTTP endpoint settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Poll scheduling settings.
    #[serde(default)]
    pub poll: PollConfig,

    /// Push-path event metric settings.
    #[serde(default)]
    pub events: EventConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:8000").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// Poll scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds to sleep between the end of one poll cycle and the next.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    10
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

/// Push-path event metric configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Whether the push-path event counters are maintained at all.
    #[serde(default)]
    pub enabled: bool,

    /// Bounded size of the delivery channel, in batches.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_channel_buffer() -> usize {
    64
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_buffer: default_channel_buffer(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ExporterConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll.interval_secs must be > 0".to_string(),
            ));
        }

        if self.events.channel_buffer == 0 {
            return Err(ConfigError::Validation(
                "events.channel_buffer must be > 0".to_string(),
            ));
        }

        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            cloud: CloudConfig::default(),
            prometheus: PrometheusConfig::default(),
            poll: PollConfig::default(),
            events: EventConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
