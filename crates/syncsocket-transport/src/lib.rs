//! # SyncSocket Transport
//!
//! The duplex, named-event channel the SyncSocket protocol runs on.
//!
//! ## Overview
//!
//! The protocol engine needs very little from a connection: a stable id,
//! `emit` of a named event, a stream of incoming events, and an explicit
//! disconnect. Anything offering that (a web socket, a socket.io-style
//! channel, a pair of in-process queues) can carry a session.
//!
//! ## Key Types
//!
//! - [`Transport`] - One physical duplex connection
//! - [`Acceptor`] - Source of incoming server-side connections
//! - [`MemoryTransport`] / [`MemoryListener`] - In-process implementation
//!   with fault injection for tests
//!
//! ## Usage
//!
//! ```rust
//! use syncsocket_core::Frame;
//! use syncsocket_transport::{MemoryTransport, Transport, TransportEvent};
//!
//! # async fn example() {
//! let (a, b) = MemoryTransport::pair();
//! a.emit(Frame::new("greeting", serde_json::json!("hi"))).await.unwrap();
//! assert!(matches!(b.recv().await, Some(TransportEvent::Frame(_))));
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{MemoryListener, MemoryTransport};
pub use traits::{Acceptor, Transport, TransportEvent};
