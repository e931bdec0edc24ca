//! Session: one logical conversation with a peer that survives reconnects.
//!
//! A session owns the outbound sequence counter, the inbound dedup cursor,
//! the pending-solicited table and exactly one transport binding at a time.
//! Each binding runs a reader task that acknowledges and publishes inbound
//! envelopes; rebinding stops the old reader and disconnects the old
//! transport while every other piece of state carries over.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use syncsocket_core::{
    Ack, ConfigHandle, Envelope, Frame, Hello, HelloAck, Message, MessageType, SessionId,
};
use syncsocket_transport::{Transport, TransportEvent};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::EventBus;
use crate::error::{Result, SessionError, TerminationReason};
use crate::pending::PendingTable;
use crate::registry::WeakRegistry;

/// Which end of the handshake a session sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connecting side: sends hellos.
    Client,
    /// Accepting side: answers hellos and owns the registry.
    Server,
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Constructed, no transport attached yet.
    Unbound,
    /// Attached to a live transport.
    Active,
    /// Swapping the old transport for a new one.
    Rebinding,
    /// Ended; every operation fails with the reason.
    Terminated(TerminationReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    Pending,
    Established,
    Terminated(TerminationReason),
}

pub(crate) struct SessionState {
    /// Last index assigned to an outbound envelope.
    pub(crate) last_sent: u64,
    /// Dedup cursor: last accepted inbound index.
    pub(crate) last_received: u64,
    pub(crate) pending: PendingTable,
    binding: Option<Binding>,
    pub(crate) phase: SessionPhase,
}

struct Binding {
    transport: Arc<dyn Transport>,
    reader: JoinHandle<()>,
}

impl Binding {
    async fn teardown(self) {
        self.reader.abort();
        self.transport.disconnect().await;
    }
}

pub(crate) struct SessionShared {
    pub(crate) id: SessionId,
    role: Role,
    pub(crate) config: ConfigHandle,
    state: Mutex<SessionState>,
    /// Id of the bound connection, kept apart from `state` so logging never
    /// contends with state updates.
    conn: Mutex<Option<String>>,
    pub(crate) acks: EventBus<Ack>,
    pub(crate) messages: EventBus<Message>,
    registry: WeakRegistry,
    handshake: watch::Sender<HandshakeState>,
    first_hello: AtomicBool,
    /// Held from index assignment until the first transmission, so
    /// envelopes reach the wire in index order.
    pub(crate) send_order: Arc<tokio::sync::Mutex<()>>,
}

/// Handle to a session. Cheap to clone; clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    pub(crate) shared: Arc<SessionShared>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        role: Role,
        config: ConfigHandle,
        registry: WeakRegistry,
    ) -> Self {
        let (handshake, _) = watch::channel(HandshakeState::Pending);
        let shared = Arc::new(SessionShared {
            id,
            role,
            config,
            state: Mutex::new(SessionState {
                last_sent: 0,
                last_received: 0,
                pending: PendingTable::new(),
                binding: None,
                phase: SessionPhase::Unbound,
            }),
            conn: Mutex::new(None),
            acks: EventBus::new(),
            messages: EventBus::new(),
            registry,
            handshake,
            first_hello: AtomicBool::new(true),
            send_order: Arc::new(tokio::sync::Mutex::new(())),
        });
        session_log!(shared, info, role = ?role, "session created");
        Self { shared }
    }

    /// The logical session id.
    pub fn id(&self) -> &SessionId {
        &self.shared.id
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.shared.lock_state().phase
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.phase(), SessionPhase::Terminated(_))
    }

    /// The configuration this session reads its tunables from.
    pub fn config(&self) -> &ConfigHandle {
        &self.shared.config
    }

    /// Index of the most recently sent envelope (0 before the first send).
    pub fn last_sent_index(&self) -> u64 {
        self.shared.lock_state().last_sent
    }

    /// Index of the most recently accepted inbound envelope.
    pub fn last_received_index(&self) -> u64 {
        self.shared.lock_state().last_received
    }

    /// Solicited messages received but not yet answered, in index order.
    pub fn pending_solicited(&self) -> Vec<Message> {
        self.shared.lock_state().pending.messages()
    }

    /// Id of the currently bound transport connection.
    pub fn connection_id(&self) -> Option<String> {
        self.shared.conn_id()
    }

    /// Wait until the peer has confirmed the handshake on the current
    /// connection.
    ///
    /// Clients are confirmed by the server's hello-ack; server sessions are
    /// confirmed as soon as they are created or rebound.
    pub async fn wait_handshake(&self) -> Result<()> {
        let mut rx = self.shared.handshake.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                HandshakeState::Established => return Ok(()),
                HandshakeState::Terminated(reason) => return Err(reason.into()),
                HandshakeState::Pending => {}
            }
            if rx.changed().await.is_err() {
                return Err(SessionError::SessionTerminated(TerminationReason::Goodbye));
            }
        }
    }

    /// End the session.
    ///
    /// Removes it from its registry, disconnects the transport and fails
    /// every pending send and response wait with `SessionTerminated`.
    /// Calling it again is a no-op.
    pub async fn goodbye(&self) {
        self.shared.terminate(TerminationReason::Goodbye).await;
    }

    /// Bind `transport` to this session, replacing any previous binding.
    pub(crate) async fn attach(&self, transport: Arc<dyn Transport>) -> Result<()> {
        let shared = &self.shared;
        let attached = {
            let mut state = shared.lock_state();
            match state.phase {
                SessionPhase::Terminated(reason) => Err(reason),
                _ => {
                    let reader = tokio::spawn(run_reader(
                        Arc::downgrade(shared),
                        Arc::clone(&transport),
                    ));
                    let previous = state.binding.replace(Binding {
                        transport: Arc::clone(&transport),
                        reader,
                    });
                    state.phase = match previous {
                        Some(_) => SessionPhase::Rebinding,
                        None => SessionPhase::Active,
                    };
                    Ok(previous)
                }
            }
        };

        let previous = match attached {
            Ok(previous) => previous,
            Err(reason) => {
                transport.disconnect().await;
                return Err(reason.into());
            }
        };

        let old_conn = shared.set_conn(transport.id());
        shared.set_handshake(HandshakeState::Pending);

        if let Some(old) = previous {
            session_log!(
                shared,
                info,
                previous = %old_conn.as_deref().unwrap_or("-"),
                "rebind"
            );
            old.teardown().await;
            let mut state = shared.lock_state();
            if state.phase == SessionPhase::Rebinding {
                state.phase = SessionPhase::Active;
            }
        }
        Ok(())
    }

    /// Send a hello on `transport`; `first` is set only until one succeeds.
    pub(crate) async fn send_hello(&self, transport: &dyn Transport) {
        let first = self.shared.first_hello.load(Ordering::SeqCst);
        let hello = Hello {
            session_id: self.shared.id.clone(),
            first,
        };
        session_log!(self.shared, debug, first, "hello");
        if self.shared.emit_on(transport, hello.into()).await {
            self.shared.first_hello.store(false, Ordering::SeqCst);
        }
    }

    /// Server side: confirm the handshake on `transport`.
    pub(crate) async fn confirm_handshake(&self, transport: &dyn Transport) {
        let ack = HelloAck {
            session_id: self.shared.id.clone(),
        };
        self.shared.emit_on(transport, ack.into()).await;
        self.shared.set_handshake(HandshakeState::Established);
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Session {}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id)
            .field("role", &self.shared.role)
            .field("phase", &self.phase())
            .finish()
    }
}

impl SessionShared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn logging_enabled(&self) -> bool {
        self.config.logging_enabled()
    }

    fn conn_id(&self) -> Option<String> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_conn(&self, id: String) -> Option<String> {
        self.conn
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(id)
    }

    pub(crate) fn conn_label(&self) -> String {
        self.conn_id().unwrap_or_else(|| "-".to_owned())
    }

    fn set_handshake(&self, next: HandshakeState) {
        self.handshake.send_if_modified(|state| {
            if matches!(state, HandshakeState::Terminated(_)) || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Assign the next outbound index.
    pub(crate) fn next_index(&self) -> Result<u64> {
        let mut state = self.lock_state();
        if let SessionPhase::Terminated(reason) = state.phase {
            return Err(reason.into());
        }
        state.last_sent += 1;
        Ok(state.last_sent)
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.lock_state()
            .binding
            .as_ref()
            .map(|binding| Arc::clone(&binding.transport))
    }

    /// Hand `frame` to the currently bound transport.
    ///
    /// Failures are only logged; the retry timer covers lost frames.
    pub(crate) async fn transmit(&self, frame: Frame) {
        let Some(transport) = self.current_transport() else {
            return;
        };
        if let Err(e) = transport.emit(frame).await {
            session_log!(self, debug, error = %e, "transmit failed");
        }
    }

    /// Encode and emit `envelope` on a specific transport.
    async fn emit_on(&self, transport: &dyn Transport, envelope: Envelope) -> bool {
        let frame = match envelope.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                session_log!(self, warn, error = %e, "failed to encode envelope");
                return false;
            }
        };
        match transport.emit(frame).await {
            Ok(()) => true,
            Err(e) => {
                session_log!(self, debug, error = %e, event = envelope.event_name(), "emit failed");
                false
            }
        }
    }

    /// End the session. Returns false if it had already ended.
    pub(crate) async fn terminate(self: &Arc<Self>, reason: TerminationReason) -> bool {
        let binding = {
            let mut state = self.lock_state();
            if matches!(state.phase, SessionPhase::Terminated(_)) {
                return false;
            }
            state.phase = SessionPhase::Terminated(reason);
            state.binding.take()
        };

        let deregistered = self.registry.remove(&Session {
            shared: Arc::clone(self),
        });
        self.acks.close(reason);
        self.messages.close(reason);
        self.handshake
            .send_replace(HandshakeState::Terminated(reason));
        session_log!(self, info, %reason, deregistered, "goodbye");

        if let Some(binding) = binding {
            binding.teardown().await;
        }
        true
    }

    async fn handle_event(self: &Arc<Self>, transport: &dyn Transport, event: TransportEvent) {
        match event {
            TransportEvent::Frame(frame) => self.handle_frame(transport, frame).await,
            TransportEvent::Connected => {
                if self.role == Role::Client {
                    session_log!(self, debug, "transport reconnected");
                    self.set_handshake(HandshakeState::Pending);
                    let session = Session {
                        shared: Arc::clone(self),
                    };
                    session.send_hello(transport).await;
                }
            }
            TransportEvent::Disconnected => {
                session_log!(self, debug, "transport disconnected");
            }
        }
    }

    async fn handle_frame(&self, transport: &dyn Transport, frame: Frame) {
        match Envelope::from_frame(&frame) {
            Ok(Some(Envelope::Message(message))) => self.handle_message(transport, message).await,
            Ok(Some(Envelope::Ack(ack))) => {
                let matched = self.acks.publish(&ack);
                session_log!(self, debug, index = ack.index, matched, "ack received");
            }
            Ok(Some(Envelope::Hello(hello))) => self.handle_hello(transport, hello).await,
            Ok(Some(Envelope::HelloAck(ack))) => {
                if self.role == Role::Client && ack.session_id == self.id {
                    session_log!(self, debug, "hello acknowledged");
                    self.set_handshake(HandshakeState::Established);
                }
            }
            Ok(None) => {
                session_log!(self, debug, event = %frame.event, "ignoring non-protocol event");
            }
            Err(e) => {
                session_log!(self, warn, error = %e, "dropping malformed frame");
            }
        }
    }

    async fn handle_message(&self, transport: &dyn Transport, message: Message) {
        let index = message.index;
        self.emit_on(transport, Ack { index }.into()).await;

        let capacity = self.config.snapshot().pending_capacity;
        let (accepted, evicted) = {
            let mut state = self.lock_state();
            if index == state.last_received {
                (false, Vec::new())
            } else {
                state.last_received = index;
                let evicted = match message.kind {
                    MessageType::SolicitedMessage => {
                        state.pending.insert(message.clone(), capacity)
                    }
                    _ => Vec::new(),
                };
                (true, evicted)
            }
        };

        for dropped in evicted {
            session_log!(
                self,
                warn,
                index = dropped.index,
                event = %dropped.event,
                "pending solicited message evicted unanswered"
            );
        }

        if accepted {
            session_log!(self, debug, index, kind = message.kind.as_str(), "receive");
            self.messages.publish(&message);
        } else {
            session_log!(self, debug, index, "receive: already received");
        }
    }

    async fn handle_hello(&self, transport: &dyn Transport, hello: Hello) {
        if self.role == Role::Server && hello.session_id == self.id {
            // The peer resent its hello on a live binding; confirm again.
            self.emit_on(
                transport,
                HelloAck {
                    session_id: self.id.clone(),
                }
                .into(),
            )
            .await;
        } else {
            session_log!(self, warn, peer_session = %hello.session_id, "unexpected hello");
        }
    }
}

impl Drop for SessionShared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(binding) = state.binding.take() {
            binding.reader.abort();
        }
    }
}

async fn run_reader(session: Weak<SessionShared>, transport: Arc<dyn Transport>) {
    while let Some(event) = transport.recv().await {
        let Some(shared) = session.upgrade() else {
            break;
        };
        shared.handle_event(transport.as_ref(), event).await;
    }
}
