//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::Value;

use syncsocket_core::{Message, MessageType};

/// Application event names: dotted lowercase segments.
pub fn event_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}(\\.[a-z][a-z0-9]{0,7}){0,2}"
}

/// Simple JSON bodies.
pub fn message_body() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,32}".prop_map(Value::from),
    ]
}

pub fn message_type() -> impl Strategy<Value = MessageType> {
    prop_oneof![
        Just(MessageType::UnsolicitedMessage),
        Just(MessageType::SolicitedMessage),
        Just(MessageType::SolicitedResponse),
    ]
}

/// A well-formed message with the given index.
pub fn message(index: u64) -> impl Strategy<Value = Message> {
    (message_type(), event_name(), message_body(), 1u64..=index.max(1)).prop_map(
        move |(kind, event, body, correlation)| match kind {
            MessageType::UnsolicitedMessage => Message::unsolicited(index, event, body),
            MessageType::SolicitedMessage => Message::solicited(index, event, body),
            MessageType::SolicitedResponse => Message::response(index, correlation, event, body),
        },
    )
}

/// Inbound index sequences with runs of immediate repeats, as produced by
/// a sender whose acks get lost.
pub fn index_sequence_with_retries(max_len: usize) -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1usize..=3, 1..=max_len).prop_map(|repeats| {
        repeats
            .into_iter()
            .enumerate()
            .flat_map(|(i, n)| std::iter::repeat(i as u64 + 1).take(n))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_messages_keep_their_index(msg in message(9)) {
            prop_assert_eq!(msg.index, 9);
            if msg.kind == MessageType::SolicitedResponse {
                prop_assert!(msg.correlation_index.is_some());
            } else {
                prop_assert!(msg.correlation_index.is_none());
            }
        }

        #[test]
        fn retry_sequences_only_repeat_immediately(seq in index_sequence_with_retries(20)) {
            for pair in seq.windows(2) {
                prop_assert!(pair[1] == pair[0] || pair[1] == pair[0] + 1);
            }
        }
    }
}
