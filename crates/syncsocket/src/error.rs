//! Error types for sessions.

use std::fmt;

use syncsocket_core::CoreError;
use thiserror::Error;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// `goodbye()` was called.
    Goodbye,
    /// A send was not acknowledged within the ack timeout.
    AckTimeout,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Goodbye => f.write_str("goodbye"),
            TerminationReason::AckTimeout => f.write_str("ack timeout"),
        }
    }
}

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No ack arrived for the message within the ack timeout.
    ///
    /// The session has been terminated as a consequence.
    #[error("no ack for message {index} within the ack timeout")]
    AckTimeout { index: u64 },

    /// The session ended before the operation completed.
    #[error("session terminated: {0}")]
    SessionTerminated(TerminationReason),

    /// The application tried to use a protocol event name.
    #[error("event name {0:?} is reserved for the protocol")]
    ReservedEvent(String),

    /// A dispatch pattern failed to compile.
    #[error("invalid event pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Envelope encoding failed.
    #[error("envelope error: {0}")]
    Core(#[from] CoreError),

    /// The runtime dropped the send before it resolved.
    #[error("send cancelled")]
    Cancelled,
}

impl From<TerminationReason> for SessionError {
    fn from(reason: TerminationReason) -> Self {
        SessionError::SessionTerminated(reason)
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
