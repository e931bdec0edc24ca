//! # SyncSocket
//!
//! Reliable, reconnect-durable messaging sessions layered on an unreliable
//! named-event transport.
//!
//! ## Overview
//!
//! A transport (a web socket, an in-process pipe) may lose frames and may
//! be replaced by a new physical connection at any time. A [`Session`] adds:
//!
//! - **Sequencing**: every outbound envelope carries a per-direction index
//! - **Acknowledgment and retry**: envelopes are retransmitted until acked;
//!   a send with no ack before the timeout terminates the session
//! - **Duplicate suppression**: a retransmission of the last accepted
//!   envelope is acknowledged again but not redelivered
//! - **Solicited messaging**: request/response pairs correlated by index
//! - **Session continuity**: a hello handshake rebinds an existing session
//!   to a new connection without losing its state
//!
//! ## Usage
//!
//! ```rust,no_run
//! use syncsocket::{Client, Server, SocketConfig};
//! use syncsocket_transport::MemoryListener;
//!
//! async fn example() {
//!     let listener = MemoryListener::new();
//!     let server = Server::new(SocketConfig::default());
//!     server.wait_for_connecting(listener.clone(), |session| {
//!         let responder = session.clone();
//!         session.on_solicited_message("ping", move |index, body| {
//!             let responder = responder.clone();
//!             tokio::spawn(async move {
//!                 let reply = format!("pong:{}", body.as_str().unwrap_or_default());
//!                 let _ = responder.emit_solicited_response(index, "ping", reply).await;
//!             });
//!         });
//!     });
//!
//!     let client = Client::new(SocketConfig::default());
//!     let session = client.connect(listener.connect().unwrap()).await;
//!     let response = session
//!         .emit_solicited_message_and_wait_response("ping", "x")
//!         .await
//!         .unwrap();
//!     assert_eq!(response.body, "pong:x");
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Client                                   Server
//!   |-------- $hello {id, first} ---------->|  create / rebind / reject
//!   |<------- $hello-ack {id} --------------|
//!   |-------- $message {index: 1} -------X  |  lost
//!   |-------- $message {index: 1} --------->|  retry
//!   |<------- $ack {index: 1} --------------|
//!   |<------- $message {index: 1, ...} -----|  peer's own sequence
//!   |-------- $ack {index: 1} ------------->|
//! ```

#[macro_use]
mod logging;

pub mod bus;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod pending;
pub mod registry;
pub mod send;
pub mod server;
pub mod session;

pub use bus::{EventBus, Once, Subscription};
pub use client::Client;
pub use dispatch::{EventMatcher, HandlerHandle};
pub use error::{Result, SessionError, TerminationReason};
pub use registry::SessionRegistry;
pub use send::Response;
pub use server::{HandshakeOutcome, Server};
pub use session::{Role, Session, SessionPhase};

pub use syncsocket_core::{ConfigHandle, Message, MessageType, SessionId, SocketConfig};
