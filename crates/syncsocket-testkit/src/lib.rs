//! # SyncSocket Testkit
//!
//! Testing utilities for SyncSocket.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a client and server session already joined over an
//!   in-memory link, with handles on both transports for fault injection
//! - **Raw peers**: a hand-driven protocol endpoint for feeding exact
//!   envelopes to a session and inspecting what it sends back
//! - **Generators**: proptest strategies for envelopes and event names
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use syncsocket_testkit::fixtures::{fast_config, SessionPair};
//!
//! # async fn example() {
//! let pair = SessionPair::connect(fast_config()).await;
//! let index = pair.client_session.emit_unsolicited_message("chat", "hi").await.unwrap();
//! assert_eq!(index, 1);
//! # }
//! ```
//!
//! ## Raw Peers
//!
//! ```rust,no_run
//! use syncsocket_testkit::fixtures::{fast_config, RawPeer};
//! use syncsocket::Client;
//!
//! # async fn example() {
//! let (peer, transport) = RawPeer::new();
//! let session = Client::new(fast_config()).connect(transport).await;
//! let hello = peer.expect_hello().await;
//! assert!(hello.first);
//! # }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{fast_config, init_tracing, RawPeer, SessionPair};
pub use generators::{event_name, index_sequence_with_retries, message, message_body, message_type};
