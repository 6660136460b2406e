//! DevWatch Common Library
//!
//! This crate provides the wire contract shared by DevWatch agents and watchdogs:
//!
//! - [`telemetry`] - Telemetry data model (`SystemValue`, `Cpu`, `Ram`, `ServiceEvent`)
//! - [`envelope`] - Binary envelope encoding and decoding
//! - [`routing`] - Routing key builders and classifiers
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`broker`] - Broker connection bootstrap
//! - [`args`] - Shared CLI arguments
//! - [`error`] - Error types

pub mod args;
pub mod broker;
pub mod config;
pub mod envelope;
pub mod error;
pub mod routing;
pub mod telemetry;

// Re-export commonly used types at the crate root
pub use args::CommonArgs;
pub use config::{
    BrokerConfig, DevwatchConfig, LogFormat, LoggingConfig, load_config, parse_config,
};
pub use envelope::{CONTENT_TYPE, EnvelopeError};
pub use error::{Error, Result};
pub use routing::{
    Classified, RoutingError, all_devices_binding, build_key, classify, device_binding,
    validate_device_identifier,
};
pub use telemetry::{Cpu, Kind, Ram, ServiceEvent, ServiceEventType, SystemValue};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Example
///
/// ```ignore
/// use devwatch_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
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
