//! Error types for the event channel

use thiserror::Error;

/// Event channel error
#[derive(Debug, Error)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publish error (the event may or may not have reached the channel)
    #[error("Publish error: {0}")]
    Publish(String),

    /// Send did not complete within the configured timeout
    #[error("Publish timed out after {0} ms")]
    Timeout(u64),

    /// Subscribe / read error
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// Read abandoned because the consumer is shutting down
    #[error("Consumer cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
