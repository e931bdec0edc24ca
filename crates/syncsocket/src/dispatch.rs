//! Receive dispatch: handlers over the inbound message bus.
//!
//! A registration is a continuous filter on envelope type plus either an
//! exact event name or a regular expression over the event name. Each
//! registration gets its own task, so handlers see matching messages in
//! arrival order and never block the reader.

use regex::Regex;
use serde_json::Value;
use syncsocket_core::{Message, MessageType};
use tokio::task::JoinHandle;

use crate::bus::Subscription;
use crate::error::Result;
use crate::session::Session;

/// How a registration selects event names.
#[derive(Debug, Clone)]
pub enum EventMatcher {
    Exact(String),
    Pattern(Regex),
}

impl EventMatcher {
    /// Compile a regular expression matcher.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(EventMatcher::Pattern(Regex::new(pattern)?))
    }

    pub fn matches(&self, event: &str) -> bool {
        match self {
            EventMatcher::Exact(name) => name == event,
            EventMatcher::Pattern(re) => re.is_match(event),
        }
    }
}

/// A registered handler.
///
/// Dropping the handle leaves the handler registered; call
/// [`HandlerHandle::cancel`] to remove it. Handlers end on their own when
/// the session terminates.
#[derive(Debug)]
pub struct HandlerHandle {
    task: JoinHandle<()>,
}

impl HandlerHandle {
    /// Stop delivering to this handler.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// False once cancelled or once the session has terminated.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Session {
    /// Handle unsolicited messages named `event`; the handler gets the body.
    pub fn on_unsolicited_message<F>(&self, event: &str, handler: F) -> HandlerHandle
    where
        F: Fn(Value) + Send + 'static,
    {
        self.register(
            MessageType::UnsolicitedMessage,
            EventMatcher::Exact(event.to_owned()),
            move |message| handler(message.body),
        )
    }

    /// Handle solicited messages named `event`; the handler gets the index
    /// to pass to [`Session::emit_solicited_response`] and the body.
    pub fn on_solicited_message<F>(&self, event: &str, handler: F) -> HandlerHandle
    where
        F: Fn(u64, Value) + Send + 'static,
    {
        self.register(
            MessageType::SolicitedMessage,
            EventMatcher::Exact(event.to_owned()),
            move |message| handler(message.index, message.body),
        )
    }

    /// Handle unsolicited messages whose event name matches `pattern`.
    pub fn on_unsolicited_message_regex<F>(&self, pattern: &str, handler: F) -> Result<HandlerHandle>
    where
        F: Fn(Message) + Send + 'static,
    {
        let matcher = EventMatcher::pattern(pattern)?;
        Ok(self.register(MessageType::UnsolicitedMessage, matcher, handler))
    }

    /// Handle solicited messages whose event name matches `pattern`.
    pub fn on_solicited_message_regex<F>(&self, pattern: &str, handler: F) -> Result<HandlerHandle>
    where
        F: Fn(Message) + Send + 'static,
    {
        let matcher = EventMatcher::pattern(pattern)?;
        Ok(self.register(MessageType::SolicitedMessage, matcher, handler))
    }

    /// Stream of accepted messages matching `filter`.
    ///
    /// Yields each match once, then the termination reason when the
    /// session ends.
    pub fn subscribe_messages(
        &self,
        filter: impl Fn(&Message) -> bool + Send + 'static,
    ) -> Subscription<Message> {
        self.shared.messages.subscribe(filter)
    }

    fn register<F>(&self, kind: MessageType, matcher: EventMatcher, handler: F) -> HandlerHandle
    where
        F: Fn(Message) + Send + 'static,
    {
        let mut subscription = self
            .shared
            .messages
            .subscribe(move |m: &Message| m.kind == kind && matcher.matches(&m.event));
        let task = tokio::spawn(async move {
            while let Some(Ok(message)) = subscription.recv().await {
                handler(message);
            }
        });
        HandlerHandle { task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_matcher() {
        let m = EventMatcher::Exact("log.info".into());
        assert!(m.matches("log.info"));
        assert!(!m.matches("log.infos"));
    }

    #[test]
    fn test_pattern_matcher() {
        let m = EventMatcher::pattern(r"^log\..*").unwrap();
        assert!(m.matches("log.info"));
        assert!(!m.matches("metric.cpu"));
        assert!(!m.matches("catalog.x"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(EventMatcher::pattern("(unclosed").is_err());
    }
}
