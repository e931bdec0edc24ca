//! Send engine: sequenced, acknowledged, retried delivery.
//!
//! Every `emit*` call assigns the next outbound index and hands the envelope
//! to a delivery task that transmits it immediately, retransmits it every
//! `retry_interval` and resolves on the matching ack. If `ack_timeout`
//! passes first the whole session is terminated. Deliveries are independent:
//! many can be in flight at once, each with its own timers.
//!
//! Index assignment and the first transmission happen under the session's
//! send-order lock, so envelopes first reach the wire in index order even
//! on a multi-threaded runtime. Only retries may interleave.
//!
//! The delivery runs on its own task, so it keeps retrying even if the
//! caller stops awaiting the result. Its timers use the configuration as it
//! was when the send started.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use syncsocket_core::{check_application_event, Ack, CoreError, Envelope, Message};
use tokio::sync::OwnedMutexGuard;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{Result, SessionError, TerminationReason};
use crate::session::{Session, SessionShared};

/// Smallest retry period; a zero interval would spin.
const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Longest timer the engine arms. Larger settings mean "never" and are
/// clamped so deadline arithmetic cannot overflow.
const MAX_TIMER: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The answer to a solicited message.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub event: String,
    pub body: Value,
}

/// The right to assign the next index and transmit it first.
struct SendTurn {
    _order: OwnedMutexGuard<()>,
    index: u64,
}

impl Session {
    /// Send a fire-and-acknowledge message.
    ///
    /// Resolves with the assigned index once the peer acknowledged it.
    pub async fn emit_unsolicited_message(
        &self,
        event: &str,
        body: impl Into<Value>,
    ) -> Result<u64> {
        check_event(event)?;
        let turn = self.reserve().await?;
        let message = Message::unsolicited(turn.index, event, body.into());
        self.deliver(turn, message).await
    }

    /// Answer the solicited message that arrived with `correlation_index`.
    ///
    /// Answering an index that is not pending (already answered, evicted or
    /// never received) is logged and sent anyway.
    pub async fn emit_solicited_response(
        &self,
        correlation_index: u64,
        event: &str,
        body: impl Into<Value>,
    ) -> Result<u64> {
        check_event(event)?;
        let turn = self.reserve().await?;
        let answered = self
            .shared
            .lock_state()
            .pending
            .remove(correlation_index)
            .is_some();
        if !answered {
            session_log!(
                self.shared,
                warn,
                correlation_index,
                "responding to a solicited message that is not pending"
            );
        }
        let message = Message::response(turn.index, correlation_index, event, body.into());
        self.deliver(turn, message).await
    }

    /// Send a solicited message and wait for the peer's response.
    ///
    /// The response subscription is registered before the message goes out,
    /// so a response can never be missed. Resolves only after the message
    /// itself was acknowledged.
    pub async fn emit_solicited_message_and_wait_response(
        &self,
        event: &str,
        body: impl Into<Value>,
    ) -> Result<Response> {
        check_event(event)?;
        let turn = self.reserve().await?;
        let index = turn.index;
        let response = self.shared.messages.once(move |m: &Message| m.answers(index));

        let message = Message::solicited(index, event, body.into());
        self.deliver(turn, message).await?;

        let message = response.wait().await?;
        session_log!(self.shared, debug, index, "solicited response received");
        Ok(Response {
            event: message.event,
            body: message.body,
        })
    }

    /// Wait for the send-order lock, then assign the next index.
    async fn reserve(&self) -> Result<SendTurn> {
        let order = Arc::clone(&self.shared.send_order).lock_owned().await;
        let index = self.shared.next_index()?;
        Ok(SendTurn {
            _order: order,
            index,
        })
    }

    async fn deliver(&self, turn: SendTurn, message: Message) -> Result<u64> {
        let shared = Arc::clone(&self.shared);
        match tokio::spawn(shared.deliver(turn, message)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(SessionError::Cancelled),
        }
    }
}

impl SessionShared {
    async fn deliver(self: Arc<Self>, turn: SendTurn, message: Message) -> Result<u64> {
        let index = message.index;
        let frame = Envelope::Message(message).to_frame()?;
        let ack = self.acks.once(move |ack: &Ack| ack.index == index);

        let config = self.config.snapshot();
        let period = config.retry_interval.clamp(MIN_RETRY_INTERVAL, MAX_TIMER);
        let now = Instant::now();
        let mut retry = tokio::time::interval_at(now + period, period);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let expires = now + config.ack_timeout.min(MAX_TIMER);
        let deadline = tokio::time::sleep_until(expires);
        let ack = ack.wait();
        tokio::pin!(deadline, ack);

        session_log!(self, debug, index, "emit: send");
        self.transmit(frame.clone()).await;
        drop(turn);

        loop {
            tokio::select! {
                biased;
                result = &mut ack => {
                    return match result {
                        Ok(_) => {
                            session_log!(self, debug, index, "emit: success");
                            Ok(index)
                        }
                        // Another send hit the same deadline first.
                        Err(TerminationReason::AckTimeout) if Instant::now() >= expires => {
                            session_log!(self, warn, index, "emit: no ack before timeout");
                            Err(SessionError::AckTimeout { index })
                        }
                        Err(reason) => {
                            session_log!(self, debug, index, %reason, "emit: error");
                            Err(SessionError::SessionTerminated(reason))
                        }
                    };
                }
                () = &mut deadline => {
                    session_log!(self, warn, index, "emit: no ack before timeout");
                    self.terminate(TerminationReason::AckTimeout).await;
                    return Err(SessionError::AckTimeout { index });
                }
                _ = retry.tick() => {
                    session_log!(self, debug, index, "emit: retry");
                    self.transmit(frame.clone()).await;
                }
            }
        }
    }
}

fn check_event(event: &str) -> Result<()> {
    check_application_event(event).map_err(|e| match e {
        CoreError::ReservedEvent(name) => SessionError::ReservedEvent(name),
        other => SessionError::Core(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use syncsocket_core::{SocketConfig, EVENT_MESSAGE};
    use syncsocket_transport::{MemoryTransport, Transport, TransportEvent};

    async fn next_message(peer: &MemoryTransport) -> Message {
        loop {
            match peer.recv().await {
                Some(TransportEvent::Frame(frame)) if frame.event == EVENT_MESSAGE => {
                    match Envelope::from_frame(&frame) {
                        Ok(Some(Envelope::Message(message))) => return message,
                        other => panic!("undecodable message frame: {:?}", other),
                    }
                }
                Some(_) => continue,
                None => panic!("link closed"),
            }
        }
    }

    async fn ack(peer: &MemoryTransport, index: u64) {
        peer.emit(Envelope::Ack(Ack { index }).to_frame().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timers_do_not_overflow() {
        let config = SocketConfig::default()
            .with_logging(false)
            .with_ack_timeout(Duration::MAX)
            .with_retry_interval(Duration::MAX);
        let (peer, link) = MemoryTransport::pair();
        let session = Client::new(config).connect(link).await;

        let sender = session.clone();
        let send = tokio::spawn(async move { sender.emit_unsolicited_message("chat", "hi").await });

        let message = next_message(&peer).await;
        assert_eq!(message.index, 1);
        ack(&peer, 1).await;

        assert_eq!(send.await.unwrap().unwrap(), 1);
        assert!(!session.is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_send_keeps_its_timers() {
        let config = SocketConfig::default()
            .with_logging(false)
            .with_retry_interval(Duration::from_millis(100))
            .with_ack_timeout(Duration::from_secs(1));
        let (peer, link) = MemoryTransport::pair();
        let session = Client::new(config).connect(link).await;

        let started = Instant::now();
        let sender = session.clone();
        let send = tokio::spawn(async move { sender.emit_unsolicited_message("chat", "hi").await });
        next_message(&peer).await;

        session
            .config()
            .update(|c| c.ack_timeout = Duration::from_millis(300));

        assert!(matches!(
            send.await.unwrap(),
            Err(SessionError::AckTimeout { index: 1 })
        ));
        assert!(started.elapsed() >= Duration::from_secs(1));
    }
}
