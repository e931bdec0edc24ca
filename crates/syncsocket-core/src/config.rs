//! Protocol tunables.
//!
//! A [`ConfigHandle`] is shared by every session created through the same
//! server or client. Reads happen at the moment of use (each timer start,
//! each log line), so an update applies immediately to all holders.
//!
//! A send reads `ack_timeout` and `retry_interval` once, when it starts;
//! sends already in flight keep the values they started with.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Configuration for protocol behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketConfig {
    /// Whether protocol events are logged.
    pub logging_enabled: bool,
    /// How long a send waits for its ack before the session is terminated.
    pub ack_timeout: Duration,
    /// Period between retransmissions of an unacknowledged envelope.
    pub retry_interval: Duration,
    /// Maximum number of unanswered solicited messages retained per session.
    pub pending_capacity: usize,
    /// How long a fresh connection may stay silent before its hello arrives.
    pub hello_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            logging_enabled: true,
            ack_timeout: Duration::from_secs(30),
            retry_interval: Duration::from_secs(1),
            pending_capacity: 1024,
            hello_timeout: Duration::from_secs(10),
        }
    }
}

impl SocketConfig {
    /// Set whether logging is enabled.
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    /// Set the ack timeout.
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Set the retry interval.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the pending-solicited capacity.
    pub fn with_pending_capacity(mut self, capacity: usize) -> Self {
        self.pending_capacity = capacity;
        self
    }

    /// Set the hello timeout.
    pub fn with_hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout = timeout;
        self
    }

    /// Total transmissions of an envelope that is never acknowledged.
    ///
    /// The first transmission is immediate; retries follow every
    /// `retry_interval` and stop once `ack_timeout` has elapsed. A retry due
    /// at the same instant as the deadline is not sent.
    pub fn max_transmissions(&self) -> u64 {
        let interval = self.retry_interval.as_nanos().max(1);
        let timeout = self.ack_timeout.as_nanos();
        let count = timeout.div_ceil(interval).max(1);
        u64::try_from(count).unwrap_or(u64::MAX)
    }
}

/// Shared, mutable handle to a [`SocketConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<SocketConfig>>,
}

impl ConfigHandle {
    /// Create a handle holding `config`.
    pub fn new(config: SocketConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current configuration.
    pub fn snapshot(&self) -> SocketConfig {
        self.read().clone()
    }

    /// Whether logging is currently enabled.
    pub fn logging_enabled(&self) -> bool {
        self.read().logging_enabled
    }

    /// Apply a change; visible to every holder immediately.
    pub fn update(&self, f: impl FnOnce(&mut SocketConfig)) {
        f(&mut *self.write());
    }

    /// Replace the whole configuration.
    pub fn replace(&self, config: SocketConfig) {
        *self.write() = config;
    }

    // A panic while holding the lock cannot leave a SocketConfig half-written
    // in a way that matters, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, SocketConfig> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SocketConfig> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl From<SocketConfig> for ConfigHandle {
    fn from(config: SocketConfig) -> Self {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SocketConfig::default();
        assert!(config.logging_enabled);
        assert_eq!(config.retry_interval, Duration::from_secs(1));
        assert_eq!(config.ack_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_max_transmissions() {
        let config = SocketConfig::default()
            .with_ack_timeout(Duration::from_secs(3))
            .with_retry_interval(Duration::from_secs(1));
        assert_eq!(config.max_transmissions(), 3);

        let config = config.with_ack_timeout(Duration::from_millis(2500));
        assert_eq!(config.max_transmissions(), 3);

        let config = config.with_ack_timeout(Duration::from_millis(500));
        assert_eq!(config.max_transmissions(), 1);
    }

    proptest::proptest! {
        #[test]
        fn prop_max_transmissions_covers_timeout(
            timeout_ms in 1u64..100_000,
            interval_ms in 1u64..10_000,
        ) {
            let config = SocketConfig::default()
                .with_ack_timeout(Duration::from_millis(timeout_ms))
                .with_retry_interval(Duration::from_millis(interval_ms));
            let n = config.max_transmissions();

            // The last transmission happens strictly before the deadline.
            proptest::prop_assert!((n - 1) * interval_ms < timeout_ms);
            proptest::prop_assert!(n * interval_ms >= timeout_ms);
        }
    }

    #[test]
    fn test_handle_updates_are_shared() {
        let a = ConfigHandle::new(SocketConfig::default());
        let b = a.clone();
        a.update(|c| c.logging_enabled = false);
        assert!(!b.logging_enabled());

        b.replace(SocketConfig::default().with_retry_interval(Duration::from_millis(10)));
        assert_eq!(a.snapshot().retry_interval, Duration::from_millis(10));
    }
}
