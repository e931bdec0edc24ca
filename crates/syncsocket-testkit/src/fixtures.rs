//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use syncsocket::{Client, HandshakeOutcome, Server, Session};
use syncsocket_core::{Ack, Envelope, Frame, Hello, Message, SessionId, SocketConfig};
use syncsocket_transport::{MemoryTransport, Transport, TransportEvent};

/// Config with short timers: 100 ms retries, 1 s ack timeout.
pub fn fast_config() -> SocketConfig {
    SocketConfig::default()
        .with_retry_interval(Duration::from_millis(100))
        .with_ack_timeout(Duration::from_secs(1))
        .with_hello_timeout(Duration::from_secs(1))
}

/// Install a test-writer tracing subscriber. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A client and a server session joined over an in-memory link.
pub struct SessionPair {
    pub client: Client,
    pub server: Server,
    pub client_session: Session,
    pub server_session: Session,
    /// Client end of the link; frames emitted here go to the server.
    pub client_transport: Arc<MemoryTransport>,
    /// Server end of the link; frames emitted here go to the client.
    pub server_transport: Arc<MemoryTransport>,
}

impl SessionPair {
    /// Connect a fresh client and server sharing `config` values.
    ///
    /// Client and server get separate config handles.
    pub async fn connect(config: SocketConfig) -> Self {
        let client = Client::new(config.clone());
        let server = Server::new(config);

        let (client_end, server_end) = MemoryTransport::pair();
        let client_transport = Arc::new(client_end);
        let server_transport = Arc::new(server_end);

        let client_session = client.connect(Arc::clone(&client_transport)).await;
        let server_session = match server.accept(Arc::clone(&server_transport)).await {
            HandshakeOutcome::Created(session) => session,
            other => panic!("expected a new session, got {:?}", other),
        };

        Self {
            client,
            server,
            client_session,
            server_session,
            client_transport,
            server_transport,
        }
    }

    /// Move the pair onto a new link: the client reconnects and the server
    /// rebinds. The new link replaces `client_transport` and `server_transport`.
    pub async fn reconnect(&mut self) -> HandshakeOutcome {
        let (client_end, server_end) = MemoryTransport::pair();
        self.client_transport = Arc::new(client_end);
        self.server_transport = Arc::new(server_end);

        self.client
            .reconnect(&self.client_session, Arc::clone(&self.client_transport))
            .await
            .expect("client session is live");
        self.server.accept(Arc::clone(&self.server_transport)).await
    }
}

/// A hand-driven protocol endpoint.
///
/// The peer never acks or dedups on its own; tests decide what it sends.
pub struct RawPeer {
    transport: MemoryTransport,
}

impl RawPeer {
    /// Create a raw peer and the transport end to hand to a session.
    pub fn new() -> (Self, MemoryTransport) {
        let (ours, theirs) = MemoryTransport::pair();
        (Self { transport: ours }, theirs)
    }

    /// The peer's own transport end.
    pub fn transport(&self) -> &MemoryTransport {
        &self.transport
    }

    pub async fn send(&self, envelope: impl Into<Envelope>) {
        let frame = envelope.into().to_frame().expect("envelope encodes");
        self.transport.emit(frame).await.expect("raw peer link open");
    }

    pub async fn send_message(&self, message: &Message) {
        self.send(message.clone()).await;
    }

    pub async fn send_ack(&self, index: u64) {
        self.send(Ack { index }).await;
    }

    pub async fn send_hello(&self, session_id: &SessionId, first: bool) {
        self.send(Hello {
            session_id: session_id.clone(),
            first,
        })
        .await;
    }

    /// Send an arbitrary frame, protocol or not.
    pub async fn send_frame(&self, event: &str, payload: Value) {
        self.transport
            .emit(Frame::new(event, payload))
            .await
            .expect("raw peer link open");
    }

    /// Wait for the next protocol envelope. `None` once disconnected.
    pub async fn next_envelope(&self) -> Option<Envelope> {
        loop {
            match self.transport.recv().await? {
                TransportEvent::Frame(frame) => {
                    if let Ok(Some(envelope)) = Envelope::from_frame(&frame) {
                        return Some(envelope);
                    }
                }
                TransportEvent::Connected => {}
                TransportEvent::Disconnected => return None,
            }
        }
    }

    /// Wait for the next hello, skipping anything else.
    pub async fn expect_hello(&self) -> Hello {
        loop {
            match self.next_envelope().await {
                Some(Envelope::Hello(hello)) => return hello,
                Some(_) => continue,
                None => panic!("link closed before hello"),
            }
        }
    }

    /// Wait for the next message envelope, skipping anything else.
    pub async fn expect_message(&self) -> Message {
        loop {
            match self.next_envelope().await {
                Some(Envelope::Message(message)) => return message,
                Some(_) => continue,
                None => panic!("link closed before message"),
            }
        }
    }

    /// Wait for the next ack, skipping anything else.
    pub async fn expect_ack(&self) -> Ack {
        loop {
            match self.next_envelope().await {
                Some(Envelope::Ack(ack)) => return ack,
                Some(_) => continue,
                None => panic!("link closed before ack"),
            }
        }
    }

    /// Every protocol envelope already queued, without waiting.
    pub fn drain(&self) -> Vec<Envelope> {
        let mut envelopes = Vec::new();
        while let Some(event) = self.transport.try_recv() {
            if let TransportEvent::Frame(frame) = event {
                if let Ok(Some(envelope)) = Envelope::from_frame(&frame) {
                    envelopes.push(envelope);
                }
            }
        }
        envelopes
    }
}
