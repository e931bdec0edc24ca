//! Connecting side: session creation and reconnection.

use std::sync::Arc;

use syncsocket_core::{ConfigHandle, SessionId};
use syncsocket_transport::Transport;

use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::session::{Role, Session};

/// The connecting side of the protocol.
///
/// Keeps its sessions in its own registry so they can be looked up again
/// when a connection has to be replaced.
#[derive(Clone, Default)]
pub struct Client {
    config: ConfigHandle,
    registry: SessionRegistry,
}

impl Client {
    pub fn new(config: impl Into<ConfigHandle>) -> Self {
        Self {
            config: config.into(),
            registry: SessionRegistry::new(),
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Live sessions created by this client.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Start a new session over `transport`.
    ///
    /// Generates a fresh session id and sends the first hello right away;
    /// sends may be issued immediately, they are retried until the server
    /// has bound the session. Use [`Session::wait_handshake`] to wait for
    /// the server's confirmation.
    pub async fn connect<T: Transport>(&self, transport: T) -> Session {
        let session = Session::new(
            SessionId::generate(),
            Role::Client,
            self.config.clone(),
            self.registry.downgrade(),
        );
        // A freshly generated id cannot collide.
        let _ = self.registry.insert_new(session.clone());

        let transport: Arc<dyn Transport> = Arc::new(transport);
        // Only fails for terminated sessions, which this one is not.
        let _ = session.attach(Arc::clone(&transport)).await;
        if transport.is_connected() {
            session.send_hello(&*transport).await;
        }
        session
    }

    /// Move an existing session onto a new physical connection.
    ///
    /// The old connection is disconnected; counters, the dedup cursor and
    /// pending solicited messages carry over. The server rebinds its side
    /// when it sees the (non-first) hello.
    pub async fn reconnect<T: Transport>(&self, session: &Session, transport: T) -> Result<()> {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        session.attach(Arc::clone(&transport)).await?;
        session.send_hello(&*transport).await;
        Ok(())
    }
}
