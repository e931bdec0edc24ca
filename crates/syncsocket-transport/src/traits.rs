//! Transport capabilities required by the protocol engine.
//!
//! A transport is one physical, duplex connection that emits and receives
//! named events. It may lose or duplicate application-level frames; the
//! engine supplies sequencing, acknowledgment and retry on top.

use std::sync::Arc;

use async_trait::async_trait;
use syncsocket_core::Frame;

use crate::error::Result;

/// Something that happened on a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The physical connection was (re-)established.
    ///
    /// Transports that reconnect on their own surface this after every
    /// successful reconnect; the connecting side answers with a new hello.
    Connected,
    /// A named event arrived.
    Frame(Frame),
    /// The peer went away.
    Disconnected,
}

/// One physical duplex connection.
///
/// Implementations must be thread-safe (Send + Sync). `recv` is only ever
/// called by one task at a time.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Stable identifier of this physical connection.
    fn id(&self) -> String;

    /// Emit a named event to the peer.
    ///
    /// Success means the frame was handed to the connection, not that the
    /// peer received it.
    async fn emit(&self, frame: Frame) -> Result<()>;

    /// Wait for the next event.
    ///
    /// Returns `None` once the connection is closed and drained.
    async fn recv(&self) -> Option<TransportEvent>;

    /// Close the connection. Idempotent.
    async fn disconnect(&self);

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool;
}

/// A source of newly arrived server-side connections.
#[async_trait]
pub trait Acceptor: Send + Sync + 'static {
    type Transport: Transport;

    /// Wait for the next incoming connection.
    ///
    /// Returns `None` once the acceptor is closed.
    async fn accept(&self) -> Option<Self::Transport>;
}

#[async_trait]
impl<A: Acceptor> Acceptor for Arc<A> {
    type Transport = A::Transport;

    async fn accept(&self) -> Option<Self::Transport> {
        (**self).accept().await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn id(&self) -> String {
        (**self).id()
    }

    async fn emit(&self, frame: Frame) -> Result<()> {
        (**self).emit(frame).await
    }

    async fn recv(&self) -> Option<TransportEvent> {
        (**self).recv().await
    }

    async fn disconnect(&self) {
        (**self).disconnect().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
