//! # SyncSocket Core
//!
//! Pure data model for the SyncSocket protocol: session identifiers,
//! sequenced envelopes, the reserved wire vocabulary and the shared
//! configuration handle.
//!
//! This crate contains no I/O and no timers.
//!
//! ## Key Types
//!
//! - [`SessionId`] - Logical, reconnect-durable session identity
//! - [`Message`] - Sequenced application envelope
//! - [`Ack`] / [`Hello`] / [`HelloAck`] - Protocol control envelopes
//! - [`Frame`] - Named event as carried by a transport
//! - [`Envelope`] - Decoded protocol frame
//! - [`ConfigHandle`] - Shared, mutable [`SocketConfig`]
//!
//! ## Wire Format
//!
//! ```text
//! $hello      {"sessionId": "...", "first": true}
//! $hello-ack  {"sessionId": "..."}
//! $message    {"index": 1, "type": "solicitedMessage", "event": "ping", "body": ...}
//! $message    {"index": 4, "type": "solicitedResponse", "correlationIndex": 1, ...}
//! $ack        {"index": 1}
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod types;
pub mod wire;

pub use config::{ConfigHandle, SocketConfig};
pub use envelope::{Ack, Hello, HelloAck, Message, MessageType};
pub use error::{CoreError, Result};
pub use types::SessionId;
pub use wire::{
    check_application_event, is_reserved_event, Envelope, Frame, EVENT_ACK, EVENT_HELLO,
    EVENT_HELLO_ACK, EVENT_MESSAGE,
};
