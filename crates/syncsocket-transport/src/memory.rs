//! In-memory transport for tests and demos.
//!
//! [`MemoryTransport::pair`] produces two connected ends backed by unbounded
//! channels. [`MemoryListener`] hands the server end of every
//! [`MemoryListener::connect`] to whoever is accepting. Outbound frames can
//! be dropped on purpose to simulate an at-most-once link.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use syncsocket_core::Frame;
use tokio::sync::{mpsc, watch};

use crate::error::{Result, TransportError};
use crate::traits::{Acceptor, Transport, TransportEvent};

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> String {
    format!("mem-{}", NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
}

type FrameFilter = Box<dyn FnMut(&Frame) -> bool + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One end of an in-memory connection.
pub struct MemoryTransport {
    id: String,
    connected: AtomicBool,
    /// Sender into the peer's inbox. `None` once disconnected.
    peer: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    closed: watch::Sender<bool>,
    /// Outbound frames for which this returns true are silently lost.
    drop_filter: Mutex<Option<FrameFilter>>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl MemoryTransport {
    /// Create two connected ends.
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::end(b_tx, a_rx), Self::end(a_tx, b_rx))
    }

    fn end(
        peer: mpsc::UnboundedSender<TransportEvent>,
        inbox: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: next_connection_id(),
            connected: AtomicBool::new(true),
            peer: Mutex::new(Some(peer)),
            inbox: tokio::sync::Mutex::new(inbox),
            closed,
            drop_filter: Mutex::new(None),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Lose every outbound frame for which `filter` returns true.
    ///
    /// Replaces any previously installed filter.
    pub fn drop_outbound_when(&self, filter: impl FnMut(&Frame) -> bool + Send + 'static) {
        *lock(&self.drop_filter) = Some(Box::new(filter));
    }

    /// Lose the next `count` outbound frames carrying `event`.
    pub fn drop_next(&self, event: &str, count: usize) {
        let event = event.to_owned();
        let mut remaining = count;
        self.drop_outbound_when(move |frame| {
            if remaining > 0 && frame.event == event {
                remaining -= 1;
                true
            } else {
                false
            }
        });
    }

    /// Stop losing frames.
    pub fn clear_faults(&self) {
        *lock(&self.drop_filter) = None;
    }

    /// Tell the peer end that the link was re-established underneath it,
    /// as a self-reconnecting transport would.
    pub fn signal_reconnected(&self) -> Result<()> {
        let peer = lock(&self.peer).clone().ok_or(TransportError::Disconnected)?;
        peer.send(TransportEvent::Connected)
            .map_err(|_| TransportError::Closed)
    }

    /// Frames handed to the peer.
    pub fn frames_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Frames lost by the drop filter.
    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Take the next already-queued event without waiting.
    ///
    /// Returns `None` if nothing is queued or another task is receiving.
    pub fn try_recv(&self) -> Option<TransportEvent> {
        let mut inbox = self.inbox.try_lock().ok()?;
        inbox.try_recv().ok()
    }

    fn should_drop(&self, frame: &Frame) -> bool {
        match lock(&self.drop_filter).as_mut() {
            Some(filter) => filter(frame),
            None => false,
        }
    }

    fn close(&self) -> Option<mpsc::UnboundedSender<TransportEvent>> {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.send_replace(true);
        lock(&self.peer).take()
    }
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn emit(&self, frame: Frame) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        if self.should_drop(&frame) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(conn = %self.id, event = %frame.event, "memory transport dropped frame");
            return Ok(());
        }
        let peer = lock(&self.peer).clone();
        match peer {
            Some(tx) => {
                tx.send(TransportEvent::Frame(frame))
                    .map_err(|_| TransportError::Closed)?;
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(TransportError::Disconnected),
        }
    }

    async fn recv(&self) -> Option<TransportEvent> {
        let closed = self.closed.subscribe();
        let mut inbox = self.inbox.lock().await;
        tokio::select! {
            biased;
            _ = wait_closed(closed) => None,
            event = inbox.recv() => match event {
                Some(TransportEvent::Disconnected) => {
                    // Peer hung up: drop our side so its inbox drains too.
                    self.close();
                    Some(TransportEvent::Disconnected)
                }
                other => other,
            },
        }
    }

    async fn disconnect(&self) {
        if let Some(peer) = self.close() {
            let _ = peer.send(TransportEvent::Disconnected);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Server-side acceptor for in-memory connections.
pub struct MemoryListener {
    incoming_tx: Mutex<Option<mpsc::UnboundedSender<MemoryTransport>>>,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<MemoryTransport>>,
}

impl MemoryListener {
    /// Create a new listener.
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            incoming_tx: Mutex::new(Some(tx)),
            incoming: tokio::sync::Mutex::new(rx),
        })
    }

    /// Open a new connection; returns the client end.
    pub fn connect(&self) -> Result<MemoryTransport> {
        let (client, server) = MemoryTransport::pair();
        let tx = lock(&self.incoming_tx)
            .clone()
            .ok_or(TransportError::Closed)?;
        tx.send(server).map_err(|_| TransportError::Closed)?;
        Ok(client)
    }

    /// Stop accepting. Pending connections are still delivered.
    pub fn close(&self) {
        lock(&self.incoming_tx).take();
    }
}

#[async_trait]
impl Acceptor for MemoryListener {
    type Transport = MemoryTransport;

    async fn accept(&self) -> Option<MemoryTransport> {
        self.incoming.lock().await.recv().await
    }
}
