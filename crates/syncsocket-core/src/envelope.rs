//! Protocol envelopes.
//!
//! These are the structures exchanged inside transport frames. Field names
//! on the wire are camelCase so a peer written against a JSON socket library
//! sees the same shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::SessionId;

/// Classification of a message envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    /// Fire-and-acknowledge, no application reply expected.
    UnsolicitedMessage,
    /// Expects exactly one correlated `SolicitedResponse`.
    SolicitedMessage,
    /// Answer to a `SolicitedMessage`; carries its index as correlation.
    SolicitedResponse,
}

impl MessageType {
    /// Wire name of the type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MessageType::UnsolicitedMessage => "unsolicitedMessage",
            MessageType::SolicitedMessage => "solicitedMessage",
            MessageType::SolicitedResponse => "solicitedResponse",
        }
    }
}

/// A sequenced message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Per-session, per-direction sequence number assigned by the sender.
    pub index: u64,
    /// Envelope classification.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Index of the solicited message being answered.
    ///
    /// Only present on `SolicitedResponse`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_index: Option<u64>,
    /// Application event name.
    pub event: String,
    /// Opaque application payload.
    #[serde(default)]
    pub body: Value,
}

impl Message {
    /// Build an unsolicited message.
    pub fn unsolicited(index: u64, event: impl Into<String>, body: Value) -> Self {
        Self {
            index,
            kind: MessageType::UnsolicitedMessage,
            correlation_index: None,
            event: event.into(),
            body,
        }
    }

    /// Build a solicited message.
    pub fn solicited(index: u64, event: impl Into<String>, body: Value) -> Self {
        Self {
            index,
            kind: MessageType::SolicitedMessage,
            correlation_index: None,
            event: event.into(),
            body,
        }
    }

    /// Build a response to the solicited message with index `correlation_index`.
    pub fn response(
        index: u64,
        correlation_index: u64,
        event: impl Into<String>,
        body: Value,
    ) -> Self {
        Self {
            index,
            kind: MessageType::SolicitedResponse,
            correlation_index: Some(correlation_index),
            event: event.into(),
            body,
        }
    }

    /// True if this envelope answers the solicited message `index`.
    pub fn answers(&self, index: u64) -> bool {
        self.kind == MessageType::SolicitedResponse && self.correlation_index == Some(index)
    }
}

/// Acknowledgment of the message with `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub index: u64,
}

/// Handshake sent by the connecting side on every physical connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    /// The logical session this connection belongs to.
    pub session_id: SessionId,
    /// True only on the very first hello for this session id.
    pub first: bool,
}

/// Server's confirmation that a hello was accepted (created or rebound).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloAck {
    pub session_id: SessionId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_shape() {
        let msg = Message::unsolicited(3, "chat", json!("hi"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"index": 3, "type": "unsolicitedMessage", "event": "chat", "body": "hi"})
        );
    }

    #[test]
    fn test_response_carries_correlation_index() {
        let msg = Message::response(7, 2, "ping", json!("pong"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "solicitedResponse");
        assert_eq!(value["correlationIndex"], 2);
        assert!(msg.answers(2));
        assert!(!msg.answers(7));
    }

    #[test]
    fn test_solicited_message_does_not_answer() {
        let msg = Message::solicited(2, "ping", Value::Null);
        assert!(!msg.answers(2));
        assert_eq!(msg.kind.as_str(), "solicitedMessage");
    }

    #[test]
    fn test_missing_body_defaults_to_null() {
        let msg: Message =
            serde_json::from_value(json!({"index": 1, "type": "solicitedMessage", "event": "e"}))
                .unwrap();
        assert_eq!(msg.body, Value::Null);
        assert_eq!(msg.correlation_index, None);
    }

    #[test]
    fn test_hello_wire_shape() {
        let hello = Hello {
            session_id: SessionId::new("abc"),
            first: true,
        };
        assert_eq!(
            serde_json::to_value(&hello).unwrap(),
            json!({"sessionId": "abc", "first": true})
        );
    }
}
