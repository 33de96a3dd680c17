//! Dirigera Common Library
//!
//! Shared types and utilities for the Dirigera Prometheus bridge:
//!
//! - [`device`] - Device snapshots and typed patches (`DeviceSnapshot`, `DevicePatch`)
//! - [`schema`] - Static attribute schemas per device type (`SchemaCatalog`)
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`error`] - Error types

pub mod config;
pub mod device;
pub mod error;
pub mod schema;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, load_config, parse_config};
pub use device::{Capabilities, DevicePatch, DeviceSnapshot, Room, value_to_string};
pub use error::{Error, Result};
pub use schema::{AttributeField, BASE_FIELDS, SchemaCatalog, ValueType};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
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
