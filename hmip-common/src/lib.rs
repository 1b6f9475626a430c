//! HomematicIP Exporter Common Library
//!
//! This crate provides shared types and utilities for the exporter
//! components:
//!
//! - [`model`] - Common device/group data model (`Device`, `Group`, `ChangeEvent`)
//! - [`client`] - The upstream session boundary trait (`HomeClient`)
//! - [`config`] - Configuration loading (JSON5 format) and connection settings
//! - [`error`] - Error types

pub mod client;
pub mod config;
pub mod error;
pub mod model;

// Re-export commonly used types at the crate root
pub use client::HomeClient;
pub use config::{CloudConfig, LogFormat, LoggingConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use model::{
    ChangeEvent, Device, EVENT_DEVICE_CHANGED, Group, ROOM_GROUP_TYPE, WindowState,
};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
