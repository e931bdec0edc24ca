//! Error types for the SyncSocket core.

use thiserror::Error;

/// Errors raised while building or parsing protocol frames.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("malformed {event} payload: {reason}")]
    Decode { event: String, reason: String },

    #[error("event name {0:?} is reserved for the protocol")]
    ReservedEvent(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
