//! Error types for event sources.

use thiserror::Error;

/// Errors that can occur while receiving change events
#[derive(Debug, Error)]
pub enum BusError {
    /// Connection to the broker failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Subscription could not be created
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Publishing into a source failed (receiver gone)
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Payload is not a known change event
    #[error("Invalid message on {subject}: {reason}")]
    InvalidMessage { subject: String, reason: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Serialization(err.to_string())
    }
}
