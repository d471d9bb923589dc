//! Transport seam
//!
//! A [`Connector`] opens one [`Transport`] per connection attempt. The
//! transport reports its lifecycle back through the [`TransportEvents`] sink
//! it was handed:
//!
//! ```text
//! Connector::open ──Err──> construction failure (no events follow)
//!        │
//!        └──Ok(transport)──> Opened? ─> Message* ─> Error? ─> Closed
//! ```
//!
//! A transport emits `Closed` exactly once, including when it never managed
//! to open. Emitting `Error` never implies anything by itself; the manager
//! waits for `Closed` before it decides whether to reconnect.

use crate::error::Result;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

/// WebSocket data frame, text or binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Lifecycle event reported by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake completed, frames can now be written
    Opened,
    /// Data frame received from the server
    Message(WsMessage),
    /// Transport-level failure; a `Closed` event always follows
    Error(String),
    /// Transport is gone
    Closed { code: Option<u16>, reason: String },
}

/// Event tagged with the id of the transport that produced it
#[derive(Debug)]
pub(crate) struct TransportSignal {
    pub(crate) transport_id: u64,
    pub(crate) event: TransportEvent,
}

/// Sink a transport uses to report its events to the connection manager
///
/// Every sink is bound to one transport id. Events from a transport the
/// manager has already let go of are discarded on arrival.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    transport_id: u64,
    tx: UnboundedSender<TransportSignal>,
}

impl TransportEvents {
    pub(crate) fn new(transport_id: u64, tx: UnboundedSender<TransportSignal>) -> Self {
        Self { transport_id, tx }
    }

    /// Id of the transport this sink belongs to
    pub fn transport_id(&self) -> u64 {
        self.transport_id
    }

    /// Report an event. Returns `false` once the manager has shut down.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TransportSignal {
                transport_id: self.transport_id,
                event,
            })
            .is_ok()
    }
}

/// Write half of an open (or opening) transport
pub trait Transport: Send {
    /// Write a text frame
    ///
    /// Only called by the manager while the transport is open.
    fn send(&mut self, text: String) -> Result<()>;

    /// Begin closing the transport
    ///
    /// The manager releases the handle right after calling this and ignores
    /// any events the transport emits afterwards.
    fn close(&mut self);
}

/// Factory for transports
///
/// `open` must return quickly: it validates its input and starts the
/// connection attempt in the background. An `Err` is a construction failure
/// and no events may be emitted for it.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &Url, events: TransportEvents) -> Result<Box<dyn Transport>>;
}
