//! Delivery guarantees: retry, timeout, dedup and termination.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;
use syncsocket::{
    Client, Message, SessionError, SessionPhase, SocketConfig, TerminationReason,
};
use syncsocket_core::{Envelope, EVENT_ACK, EVENT_MESSAGE};
use syncsocket_testkit::{
    fast_config, index_sequence_with_retries, init_tracing, RawPeer, SessionPair,
};
use syncsocket_transport::Transport;

/// Let spawned tasks drain their queues.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn message_indices(envelopes: &[Envelope]) -> Vec<u64> {
    envelopes
        .iter()
        .filter_map(|e| match e {
            Envelope::Message(m) => Some(m.index),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_send_resolves_on_ack() {
    let pair = SessionPair::connect(fast_config()).await;

    let index = pair
        .client_session
        .emit_unsolicited_message("chat", "hi")
        .await
        .unwrap();
    assert_eq!(index, 1);

    let index = pair
        .client_session
        .emit_unsolicited_message("chat", "again")
        .await
        .unwrap();
    assert_eq!(index, 2);
    assert_eq!(pair.client_session.last_sent_index(), 2);
    assert_eq!(pair.server_session.last_received_index(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unacked_send_transmits_until_timeout() {
    init_tracing();
    let config = fast_config();
    let expected = config.max_transmissions();
    assert_eq!(expected, 10);

    let (peer, transport) = RawPeer::new();
    let session = Client::new(config).connect(transport).await;

    let err = session
        .emit_unsolicited_message("chat", "lost")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::AckTimeout { index: 1 }));
    assert_eq!(
        session.phase(),
        SessionPhase::Terminated(TerminationReason::AckTimeout)
    );

    let sent = message_indices(&peer.drain());
    assert_eq!(sent.len() as u64, expected);
    assert!(sent.iter().all(|&i| i == 1));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_unacked_sends_all_time_out() {
    let config = fast_config();
    let expected = config.max_transmissions();

    let (peer, transport) = RawPeer::new();
    let session = Client::new(config).connect(transport).await;

    let (a, b, c) = tokio::join!(
        session.emit_unsolicited_message("a", 1),
        session.emit_unsolicited_message("b", 2),
        session.emit_unsolicited_message("c", 3),
    );
    for result in [a, b, c] {
        assert!(matches!(result, Err(SessionError::AckTimeout { .. })));
    }

    let sent = message_indices(&peer.drain());
    for index in 1..=3 {
        let count = sent.iter().filter(|&&i| i == index).count() as u64;
        assert_eq!(count, expected, "transmissions of index {}", index);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_leave_in_index_order() {
    let config = fast_config()
        .with_logging(false)
        .with_retry_interval(Duration::from_secs(5))
        .with_ack_timeout(Duration::from_secs(10));

    for _ in 0..50 {
        let (peer, transport) = RawPeer::new();
        let session = Client::new(config.clone()).connect(transport).await;

        let sends: Vec<_> = (0..4)
            .map(|n| {
                let sender = session.clone();
                tokio::spawn(async move { sender.emit_unsolicited_message("tick", n).await })
            })
            .collect();

        let mut first_seen = Vec::new();
        while first_seen.len() < 4 {
            let message = peer.expect_message().await;
            if !first_seen.contains(&message.index) {
                first_seen.push(message.index);
            }
        }
        assert_eq!(first_seen, vec![1, 2, 3, 4]);

        for index in 1..=4 {
            peer.send_ack(index).await;
        }
        for send in sends {
            send.await.unwrap().unwrap();
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_lost_frames_are_retried() {
    let pair = SessionPair::connect(fast_config()).await;
    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    pair.server_session
        .on_unsolicited_message("chat", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    pair.client_transport.drop_next(EVENT_MESSAGE, 2);
    let index = pair
        .client_session
        .emit_unsolicited_message("chat", "hi")
        .await
        .unwrap();
    settle().await;

    assert_eq!(index, 1);
    assert_eq!(pair.client_transport.frames_dropped(), 2);
    assert_eq!(received.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_lost_ack_yields_single_delivery() {
    let pair = SessionPair::connect(fast_config()).await;
    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    pair.server_session
        .on_unsolicited_message("chat", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    pair.server_transport.drop_next(EVENT_ACK, 1);
    pair.client_session
        .emit_unsolicited_message("chat", "hi")
        .await
        .unwrap();
    settle().await;

    assert_eq!(received.load(Ordering::SeqCst), 1);
    assert_eq!(pair.server_session.last_received_index(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_is_acked_but_not_redelivered() {
    let (peer, transport) = RawPeer::new();
    let session = Client::new(fast_config()).connect(transport).await;

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    session.on_unsolicited_message("chat", move |body| {
        assert_eq!(body, json!("hi"));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let message = Message::unsolicited(1, "chat", json!("hi"));
    peer.send_message(&message).await;
    peer.send_message(&message).await;

    assert_eq!(peer.expect_ack().await.index, 1);
    assert_eq!(peer.expect_ack().await.index, 1);
    settle().await;

    assert_eq!(received.load(Ordering::SeqCst), 1);
    assert_eq!(session.last_received_index(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_and_foreign_frames_are_ignored() {
    let (peer, transport) = RawPeer::new();
    let session = Client::new(fast_config()).connect(transport).await;

    peer.send_frame(EVENT_MESSAGE, json!({"index": "one"})).await;
    peer.send_frame("telemetry", json!({"cpu": 3})).await;
    peer.send_message(&Message::unsolicited(1, "chat", json!(null)))
        .await;

    assert_eq!(peer.expect_ack().await.index, 1);
    assert_eq!(session.last_received_index(), 1);
    assert!(!session.is_terminated());
}

#[tokio::test(start_paused = true)]
async fn test_goodbye_fails_outstanding_sends() {
    let pair = SessionPair::connect(fast_config()).await;
    pair.server_transport.drop_outbound_when(|frame| frame.event == EVENT_ACK);

    let sender = pair.client_session.clone();
    let unsolicited =
        tokio::spawn(async move { sender.emit_unsolicited_message("chat", "hi").await });
    let sender = pair.client_session.clone();
    let solicited = tokio::spawn(async move {
        sender
            .emit_solicited_message_and_wait_response("ping", "x")
            .await
    });

    tokio::time::sleep(Duration::from_millis(250)).await;
    pair.client_session.goodbye().await;

    assert!(matches!(
        unsolicited.await.unwrap(),
        Err(SessionError::SessionTerminated(TerminationReason::Goodbye))
    ));
    assert!(matches!(
        solicited.await.unwrap(),
        Err(SessionError::SessionTerminated(TerminationReason::Goodbye))
    ));

    assert!(pair.client.sessions().is_empty());
    assert!(!pair.client_transport.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_goodbye_is_idempotent_and_final() {
    let pair = SessionPair::connect(fast_config()).await;

    pair.server_session.goodbye().await;
    pair.server_session.goodbye().await;

    assert_eq!(
        pair.server_session.phase(),
        SessionPhase::Terminated(TerminationReason::Goodbye)
    );
    assert!(pair.server.registry().is_empty());
    assert!(matches!(
        pair.server_session.emit_unsolicited_message("chat", "late").await,
        Err(SessionError::SessionTerminated(TerminationReason::Goodbye))
    ));
    assert!(pair.server_session.wait_handshake().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_ack_timeout_terminates_session() {
    let pair = SessionPair::connect(fast_config()).await;
    pair.server_transport.drop_outbound_when(|frame| frame.event == EVENT_ACK);

    let err = pair
        .client_session
        .emit_unsolicited_message("chat", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::AckTimeout { index: 1 }));
    assert!(pair.client.sessions().is_empty());

    // Anything after the timeout fails with the termination reason.
    assert!(matches!(
        pair.client_session.emit_unsolicited_message("chat", "late").await,
        Err(SessionError::SessionTerminated(TerminationReason::AckTimeout))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_config_updates_apply_to_new_sends() {
    let pair = SessionPair::connect(fast_config()).await;
    pair.server_transport.drop_outbound_when(|frame| frame.event == EVENT_ACK);
    pair.client.config().update(|config| {
        config.ack_timeout = Duration::from_millis(300);
    });

    let started = tokio::time::Instant::now();
    let result = pair.client_session.emit_unsolicited_message("chat", "hi").await;
    assert!(matches!(result, Err(SessionError::AckTimeout { .. })));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_reserved_event_names_are_rejected() {
    let pair = SessionPair::connect(SocketConfig::default().with_logging(false)).await;

    let err = pair
        .client_session
        .emit_unsolicited_message("$ack", json!(null))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::ReservedEvent(ref e) if e == "$ack"));
    assert_eq!(pair.client_session.last_sent_index(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_retransmissions_are_acked_and_delivered_once(
        sequence in index_sequence_with_retries(12),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        let (acks, delivered, last) = runtime.block_on(async {
            let (peer, transport) = RawPeer::new();
            let session = Client::new(fast_config().with_logging(false))
                .connect(transport)
                .await;
            let mut stream = session.subscribe_messages(|_| true);

            for &index in &sequence {
                peer.send_message(&Message::unsolicited(index, "tick", json!(index)))
                    .await;
            }

            let mut acks = Vec::new();
            for _ in &sequence {
                acks.push(peer.expect_ack().await.index);
            }

            let mut delivered = Vec::new();
            while let Ok(Some(Ok(message))) =
                tokio::time::timeout(Duration::from_millis(10), stream.recv()).await
            {
                delivered.push(message.index);
            }
            (acks, delivered, session.last_received_index())
        });

        let mut distinct = sequence.clone();
        distinct.dedup();

        prop_assert_eq!(acks, sequence.clone());
        prop_assert_eq!(delivered, distinct.clone());
        prop_assert_eq!(last, *distinct.last().unwrap());
    }
}
