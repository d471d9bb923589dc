use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Connection state as seen by consumers
///
/// Only the connection manager's driver moves between states; everyone
/// else observes them through [`crate::ConnectionStatus`] or the watch
/// channels on [`crate::ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free counters updated by the driver task
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
    messages_malformed: AtomicU64,
    reconnects_scheduled: AtomicU64,
    reconnect_attempt: AtomicUsize,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_malformed(&self) {
        self.messages_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Mirror of the driver's reconnect counter
    #[inline]
    pub fn set_reconnect_attempt(&self, attempt: usize) {
        self.reconnect_attempt.store(attempt, Ordering::Release);
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    pub fn messages_malformed(&self) -> u64 {
        self.messages_malformed.load(Ordering::Relaxed)
    }

    pub fn reconnects_scheduled(&self) -> u64 {
        self.reconnects_scheduled.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempt(&self) -> usize {
        self.reconnect_attempt.load(Ordering::Acquire)
    }

    pub fn snapshot(&self, connection_state: ConnectionState) -> Metrics {
        Metrics {
            messages_sent: self.messages_sent(),
            messages_received: self.messages_received(),
            messages_dropped: self.messages_dropped(),
            messages_malformed: self.messages_malformed(),
            reconnects_scheduled: self.reconnects_scheduled(),
            reconnect_attempt: self.reconnect_attempt(),
            connection_state,
        }
    }
}

/// Manager metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Sends dropped because the manager was not connected
    pub messages_dropped: u64,
    /// Inbound frames discarded because they were not a valid envelope
    pub messages_malformed: u64,
    pub reconnects_scheduled: u64,
    /// Current value of the reconnect counter (0 after a successful open)
    pub reconnect_attempt: usize,
    pub connection_state: ConnectionState,
}
