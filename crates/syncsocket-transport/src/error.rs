//! Error types for the transport layer.

use thiserror::Error;

/// Errors that can occur on a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection was disconnected (locally or by the peer).
    #[error("transport disconnected")]
    Disconnected,

    /// The listener or channel behind the transport has been closed.
    #[error("transport closed")]
    Closed,

    /// Underlying I/O failure.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
