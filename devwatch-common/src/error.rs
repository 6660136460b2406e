use thiserror::Error;

use crate::envelope::EnvelopeError;
use crate::routing::RoutingError;

/// Common error type for DevWatch components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration validation failed: {0}")]
    Validation(String),

    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Invalid routing key: {0}")]
    Routing(#[from] RoutingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Result type alias using DevWatch's Error.
pub type Result<T> = std::result::Result<T, Error>;
