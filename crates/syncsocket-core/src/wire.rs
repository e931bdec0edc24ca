//! Transport framing and the reserved protocol vocabulary.
//!
//! A transport carries named events with an opaque payload. The protocol
//! claims a handful of `$`-prefixed names for itself; everything an
//! application sends travels inside a `$message` envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{Ack, Hello, HelloAck, Message};
use crate::error::{CoreError, Result};

/// Event carrying a [`Hello`].
pub const EVENT_HELLO: &str = "$hello";
/// Event carrying a [`HelloAck`].
pub const EVENT_HELLO_ACK: &str = "$hello-ack";
/// Event carrying an [`Ack`].
pub const EVENT_ACK: &str = "$ack";
/// Event carrying a [`Message`].
pub const EVENT_MESSAGE: &str = "$message";

/// Prefix reserved for protocol events.
pub const RESERVED_PREFIX: char = '$';

/// Returns true if `event` belongs to the protocol's reserved namespace.
pub fn is_reserved_event(event: &str) -> bool {
    event.starts_with(RESERVED_PREFIX)
}

/// Reject application event names in the reserved namespace.
pub fn check_application_event(event: &str) -> Result<()> {
    if is_reserved_event(event) {
        return Err(CoreError::ReservedEvent(event.to_owned()));
    }
    Ok(())
}

/// One named event as carried by a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    pub payload: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Hello(Hello),
    HelloAck(HelloAck),
    Ack(Ack),
    Message(Message),
}

impl Envelope {
    /// The transport event name this envelope travels under.
    pub fn event_name(&self) -> &'static str {
        match self {
            Envelope::Hello(_) => EVENT_HELLO,
            Envelope::HelloAck(_) => EVENT_HELLO_ACK,
            Envelope::Ack(_) => EVENT_ACK,
            Envelope::Message(_) => EVENT_MESSAGE,
        }
    }

    /// Encode into a transport frame.
    pub fn to_frame(&self) -> Result<Frame> {
        let payload = match self {
            Envelope::Hello(hello) => serde_json::to_value(hello),
            Envelope::HelloAck(ack) => serde_json::to_value(ack),
            Envelope::Ack(ack) => serde_json::to_value(ack),
            Envelope::Message(message) => serde_json::to_value(message),
        }
        .map_err(CoreError::Encode)?;
        Ok(Frame::new(self.event_name(), payload))
    }

    /// Decode a transport frame.
    ///
    /// Returns `Ok(None)` for events outside the protocol vocabulary, which
    /// the engine ignores.
    pub fn from_frame(frame: &Frame) -> Result<Option<Self>> {
        let envelope = match frame.event.as_str() {
            EVENT_HELLO => Envelope::Hello(decode(frame)?),
            EVENT_HELLO_ACK => Envelope::HelloAck(decode(frame)?),
            EVENT_ACK => Envelope::Ack(decode(frame)?),
            EVENT_MESSAGE => Envelope::Message(decode(frame)?),
            _ => return Ok(None),
        };
        Ok(Some(envelope))
    }
}

fn decode<T: serde::de::DeserializeOwned>(frame: &Frame) -> Result<T> {
    T::deserialize(&frame.payload).map_err(|e| CoreError::Decode {
        event: frame.event.clone(),
        reason: e.to_string(),
    })
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        Envelope::Message(message)
    }
}

impl From<Ack> for Envelope {
    fn from(ack: Ack) -> Self {
        Envelope::Ack(ack)
    }
}

impl From<Hello> for Envelope {
    fn from(hello: Hello) -> Self {
        Envelope::Hello(hello)
    }
}

impl From<HelloAck> for Envelope {
    fn from(ack: HelloAck) -> Self {
        Envelope::HelloAck(ack)
    }
}
