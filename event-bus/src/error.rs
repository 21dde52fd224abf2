//! Error types for the event bus

use crate::types::Channel;
use thiserror::Error;

/// Event bus error
#[derive(Debug, Error)]
pub enum Error {
    /// Channel name not recognised
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Bus dropped; no more messages will arrive
    #[error("Channel closed: {0}")]
    Closed(Channel),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Subscriber handler failed
    #[error("Handler error: {0}")]
    Handler(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
