//! Accepting side: hello handshake, session creation and rebind.
//!
//! ```text
//! hello{id, first}          registry has id?   outcome
//! ----------------------    ----------------   ---------------------------
//! any                       yes                Rebound: swap transport
//! first = true              no                 Created: new session, on_connect
//! first = false             no                 Rejected: disconnect
//! ```

use std::sync::Arc;

use syncsocket_core::{ConfigHandle, Envelope, Hello, SessionId};
use syncsocket_transport::{Acceptor, Transport, TransportEvent};
use tokio::task::JoinHandle;

use crate::registry::SessionRegistry;
use crate::session::{Role, Session};

/// Result of running the handshake on one incoming connection.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// A new session was created and registered.
    Created(Session),
    /// An existing session moved onto this connection.
    Rebound(Session),
    /// Non-first hello for an unknown session; the connection was dropped.
    Rejected(SessionId),
    /// The connection closed before sending a hello.
    Closed,
    /// No hello within `hello_timeout`; the connection was dropped.
    TimedOut,
}

type ConnectCallback = dyn Fn(Session) + Send + Sync;

/// The accepting side of the protocol.
///
/// Owns the session registry and the configuration shared by all of its
/// sessions. Cheap to clone.
#[derive(Clone, Default)]
pub struct Server {
    config: ConfigHandle,
    registry: SessionRegistry,
    /// Serializes the create-or-rebind decision with the attach that
    /// follows it, so a session is never rebound before its first binding.
    binding: Arc<tokio::sync::Mutex<()>>,
}

impl Server {
    /// Create a server with its own, empty registry.
    pub fn new(config: impl Into<ConfigHandle>) -> Self {
        Self {
            config: config.into(),
            registry: SessionRegistry::new(),
            binding: Arc::default(),
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Accept connections from `acceptor` until it closes.
    ///
    /// `on_connect` runs once per newly created session, before its first
    /// message is read, so handlers registered there see everything. Rebinds
    /// do not invoke it.
    pub fn wait_for_connecting<A, F>(&self, acceptor: A, on_connect: F) -> JoinHandle<()>
    where
        A: Acceptor,
        F: Fn(Session) + Send + Sync + 'static,
    {
        let server = self.clone();
        let on_connect: Arc<ConnectCallback> = Arc::new(on_connect);
        tokio::spawn(async move {
            while let Some(transport) = acceptor.accept().await {
                let server = server.clone();
                let on_connect = Arc::clone(&on_connect);
                tokio::spawn(async move {
                    server
                        .handshake(Arc::new(transport), Some(on_connect.as_ref()))
                        .await;
                });
            }
            if server.config.logging_enabled() {
                tracing::info!("acceptor closed");
            }
        })
    }

    /// Run the handshake on a single incoming connection.
    pub async fn accept<T: Transport>(&self, transport: T) -> HandshakeOutcome {
        self.handshake(Arc::new(transport), None).await
    }

    async fn handshake(
        &self,
        transport: Arc<dyn Transport>,
        on_connect: Option<&ConnectCallback>,
    ) -> HandshakeOutcome {
        let conn = transport.id();
        let hello_timeout = self.config.snapshot().hello_timeout;

        let hello = match tokio::time::timeout(hello_timeout, self.wait_for_hello(&*transport)).await
        {
            Ok(Some(hello)) => hello,
            Ok(None) => {
                if self.config.logging_enabled() {
                    tracing::debug!(%conn, "connection closed before hello");
                }
                return HandshakeOutcome::Closed;
            }
            Err(_) => {
                if self.config.logging_enabled() {
                    tracing::warn!(%conn, "no hello before timeout");
                }
                transport.disconnect().await;
                return HandshakeOutcome::TimedOut;
            }
        };

        let _binding = self.binding.lock().await;
        if let Some(session) = self.registry.get(&hello.session_id) {
            return self.rebind(session, transport).await;
        }

        if !hello.first {
            if self.config.logging_enabled() {
                tracing::warn!(
                    %conn,
                    session = %hello.session_id,
                    "rejecting non-first hello for unknown session"
                );
            }
            transport.disconnect().await;
            return HandshakeOutcome::Rejected(hello.session_id);
        }

        let session = Session::new(
            hello.session_id,
            Role::Server,
            self.config.clone(),
            self.registry.downgrade(),
        );
        if let Err(existing) = self.registry.insert_new(session.clone()) {
            // Taken since the lookup above; treat it as a rebind.
            return self.rebind(existing, transport).await;
        }

        if let Some(on_connect) = on_connect {
            on_connect(session.clone());
        }
        if let Err(e) = session.attach(Arc::clone(&transport)).await {
            if self.config.logging_enabled() {
                tracing::warn!(%conn, session = %session.id(), error = %e, "attach failed");
            }
            return HandshakeOutcome::Rejected(session.id().clone());
        }
        session.confirm_handshake(&*transport).await;
        HandshakeOutcome::Created(session)
    }

    async fn rebind(&self, session: Session, transport: Arc<dyn Transport>) -> HandshakeOutcome {
        match session.attach(Arc::clone(&transport)).await {
            Ok(()) => {
                session.confirm_handshake(&*transport).await;
                HandshakeOutcome::Rebound(session)
            }
            // Terminated between lookup and attach; attach already
            // disconnected the transport.
            Err(_) => HandshakeOutcome::Rejected(session.id().clone()),
        }
    }

    /// Read frames until a hello arrives. Anything before it is dropped.
    async fn wait_for_hello(&self, transport: &dyn Transport) -> Option<Hello> {
        let conn = transport.id();
        loop {
            match transport.recv().await? {
                TransportEvent::Frame(frame) => match Envelope::from_frame(&frame) {
                    Ok(Some(Envelope::Hello(hello))) => return Some(hello),
                    Ok(_) => {
                        if self.config.logging_enabled() {
                            tracing::debug!(%conn, event = %frame.event, "dropping frame before hello");
                        }
                    }
                    Err(e) => {
                        if self.config.logging_enabled() {
                            tracing::warn!(%conn, error = %e, "malformed frame before hello");
                        }
                    }
                },
                TransportEvent::Connected => {}
                TransportEvent::Disconnected => return None,
            }
        }
    }
}
