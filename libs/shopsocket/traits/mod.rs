//! # ShopSocket Traits
//!
//! Seams of the connection manager:
//!
//! - **Connector / Transport**: open and drive the underlying socket
//! - **ReconnectionStrategy**: control backoff after unexpected closes
//! - **MessageHandler**: receive inbound notifications

pub mod error;
pub mod handler;
pub mod reconnect;
pub mod transport;

pub use error::{Result, ShopSocketError};
pub use handler::{FnHandler, MessageHandler};
pub use reconnect::{ExponentialBackoff, NeverReconnect, ReconnectionStrategy};
pub use transport::{Connector, Transport, TransportEvent, TransportEvents, WsMessage};
