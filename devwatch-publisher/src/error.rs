//! Error types for the publisher.

use devwatch_common::RoutingError;
use thiserror::Error;

/// Result type alias using [`PublishError`].
pub type Result<T> = std::result::Result<T, PublishError>;

/// Errors reported synchronously by a publish call.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The value cannot be turned into a routable message. Not retried.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The broker channel rejected or failed the send.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl PublishError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an encoding error.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Check whether this is an encoding error.
    pub fn is_encoding(&self) -> bool {
        matches!(self, Self::Encoding(_))
    }
}

impl From<RoutingError> for PublishError {
    fn from(e: RoutingError) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<lapin::Error> for PublishError {
    fn from(e: lapin::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
