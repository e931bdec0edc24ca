//! Filtered multicast of inbound protocol events.
//!
//! Each session owns two buses: one for acks, one for accepted messages.
//! Subscribers register a predicate and receive either the first matching
//! item ([`EventBus::once`]) or every matching item
//! ([`EventBus::subscribe`]). Closing a bus pushes the termination reason
//! to every subscriber, so nothing waiting on a dead session hangs.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot};

use crate::error::TerminationReason;

/// What a subscriber receives: an item, or the reason the bus closed.
pub type BusResult<T> = std::result::Result<T, TerminationReason>;

type Filter<T> = Box<dyn Fn(&T) -> bool + Send>;

enum Sink<T> {
    Once(Option<oneshot::Sender<BusResult<T>>>),
    Stream(mpsc::UnboundedSender<BusResult<T>>),
}

impl<T> Sink<T> {
    fn is_closed(&self) -> bool {
        match self {
            Sink::Once(Some(tx)) => tx.is_closed(),
            Sink::Once(None) => true,
            Sink::Stream(tx) => tx.is_closed(),
        }
    }

    fn fail(self, reason: TerminationReason) {
        match self {
            Sink::Once(Some(tx)) => {
                let _ = tx.send(Err(reason));
            }
            Sink::Once(None) => {}
            Sink::Stream(tx) => {
                let _ = tx.send(Err(reason));
            }
        }
    }
}

struct Subscriber<T> {
    filter: Filter<T>,
    sink: Sink<T>,
}

struct BusInner<T> {
    subscribers: Vec<Subscriber<T>>,
    closed: Option<TerminationReason>,
}

/// A filtered multicast channel.
pub struct EventBus<T> {
    inner: Mutex<BusInner<T>>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Create an open bus with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                subscribers: Vec::new(),
                closed: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusInner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver `item` to every subscriber whose filter accepts it.
    ///
    /// One-shot subscribers are removed after their delivery; subscribers
    /// whose receiving side is gone are pruned. Publishing on a closed bus
    /// is a no-op. Returns the number of deliveries made.
    pub fn publish(&self, item: &T) -> usize {
        let mut inner = self.lock();
        if inner.closed.is_some() {
            return 0;
        }

        let mut delivered = 0;
        inner.subscribers.retain_mut(|sub| {
            if sub.sink.is_closed() {
                return false;
            }
            if !(sub.filter)(item) {
                return true;
            }
            match &mut sub.sink {
                Sink::Once(slot) => {
                    if let Some(tx) = slot.take() {
                        if tx.send(Ok(item.clone())).is_ok() {
                            delivered += 1;
                        }
                    }
                    false
                }
                Sink::Stream(tx) => {
                    let alive = tx.send(Ok(item.clone())).is_ok();
                    if alive {
                        delivered += 1;
                    }
                    alive
                }
            }
        });
        delivered
    }

    /// Wait for the first item matching `filter`.
    pub fn once(&self, filter: impl Fn(&T) -> bool + Send + 'static) -> Once<T> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        match inner.closed {
            Some(reason) => {
                let _ = tx.send(Err(reason));
            }
            None => inner.subscribers.push(Subscriber {
                filter: Box::new(filter),
                sink: Sink::Once(Some(tx)),
            }),
        }
        Once { rx }
    }

    /// Receive every item matching `filter` until the bus closes.
    pub fn subscribe(&self, filter: impl Fn(&T) -> bool + Send + 'static) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        match inner.closed {
            Some(reason) => {
                let _ = tx.send(Err(reason));
            }
            None => inner.subscribers.push(Subscriber {
                filter: Box::new(filter),
                sink: Sink::Stream(tx),
            }),
        }
        Subscription { rx }
    }

    /// Close the bus, failing every current and future subscriber with
    /// `reason`. Only the first close takes effect.
    pub fn close(&self, reason: TerminationReason) {
        let subscribers = {
            let mut inner = self.lock();
            if inner.closed.is_some() {
                return;
            }
            inner.closed = Some(reason);
            std::mem::take(&mut inner.subscribers)
        };
        for sub in subscribers {
            sub.sink.fail(reason);
        }
    }

    /// The reason the bus closed, if it has.
    pub fn closed_reason(&self) -> Option<TerminationReason> {
        self.lock().closed
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|sub| !sub.sink.is_closed());
        inner.subscribers.len()
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending one-shot subscription.
///
/// Dropping it unsubscribes.
pub struct Once<T> {
    rx: oneshot::Receiver<BusResult<T>>,
}

impl<T> Once<T> {
    /// Wait for the matching item or the bus closing.
    pub async fn wait(self) -> BusResult<T> {
        // The sender only disappears without a value when the bus itself is
        // dropped, which happens with the session.
        self.rx.await.unwrap_or(Err(TerminationReason::Goodbye))
    }
}

/// Continuous subscription.
///
/// Dropping it unsubscribes.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<BusResult<T>>,
}

impl<T> Subscription<T> {
    /// Next matching item, the close reason once, then `None`.
    pub async fn recv(&mut self) -> Option<BusResult<T>> {
        self.rx.recv().await
    }
}
