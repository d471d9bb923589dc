use crate::core::connection_state::ConnectionState;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::time::Duration;

/// Structured event emitted by the connection manager
///
/// The manager never returns errors to its callers; this stream is the way
/// to observe failures and reconnection progress.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// State changed
    StateChanged(ConnectionState),
    /// Opening a transport to the given URL
    Connecting { url: String },
    /// Transport opened
    Connected,
    /// Transport closed (unexpectedly, or through `disconnect`)
    Disconnected { code: Option<u16>, reason: String },
    /// Transport reported an error
    Error(String),
    /// Transport could not even be constructed; no retry is scheduled
    ConstructionFailed(String),
    /// Retry timer armed
    ReconnectScheduled {
        attempt: usize,
        delay: Duration,
        identity: Option<String>,
    },
    /// Retry timer fired and a new transport is being opened
    Reconnecting { attempt: usize },
    /// Attempt ceiling reached; waiting for an explicit `connect`
    ReconnectExhausted { attempts: usize },
    /// `send` called while not connected; message discarded
    MessageDropped,
    /// Inbound frame was not a valid envelope
    MalformedMessage(String),
    /// A subscriber returned an error or panicked
    HandlerFailed(String),
}

/// Fan-out of connection events to any number of receivers
///
/// Receivers are registered on demand, so nothing is buffered while nobody
/// listens. Senders whose receiver was dropped are pruned on the next emit.
/// A full bounded receiver misses the event but stays registered.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    senders: Mutex<Vec<Sender<ConnectionEvent>>>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&self) -> Receiver<ConnectionEvent> {
        let (tx, rx) = unbounded();
        self.senders.lock().push(tx);
        rx
    }

    pub(crate) fn subscribe_bounded(&self, capacity: usize) -> Receiver<ConnectionEvent> {
        let (tx, rx) = bounded(capacity);
        self.senders.lock().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        let mut senders = self.senders.lock();
        if senders.is_empty() {
            return;
        }
        senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub(crate) fn receiver_count(&self) -> usize {
        self.senders.lock().len()
    }
}
