//! # ShopSocket
//!
//! Resilient WebSocket client for the shop's live notification feed.
//!
//! ## Features
//!
//! - **Single owner**: one driver task holds the transport, the reconnect
//!   counter and the retry timer, so no lock guards connection state
//! - **Exponential backoff**: 1s, 2s, 4s, 8s, 16s after unexpected closes,
//!   re-armed by every successful open
//! - **Push-based state**: connection state and the latest message are
//!   published through `tokio::sync::watch`
//! - **Isolated subscribers**: a failing or panicking handler never stops
//!   delivery to the others
//! - **Pluggable transport**: swap the tungstenite connector for a scripted
//!   one in tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use shopsocket::{ConnectionManager, ConnectionState, ManagerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = ConnectionManager::new(ManagerConfig::default());
//!
//!     let _sub = manager.on_message(|msg| {
//!         println!("{}: {:?}", msg.kind, msg.data);
//!     });
//!
//!     manager.connect(Some("tech-7"));
//!
//!     let mut status = manager.status();
//!     if status.wait_for(ConnectionState::Connected).await {
//!         manager.send(&serde_json::json!({ "type": "subscribe", "channel": "tickets" }));
//!     }
//!
//!     manager.shutdown().await;
//! }
//! ```

pub mod core;
pub mod traits;

pub use traits::error;

// Re-export all traits
pub use traits::*;

pub use core::{
    AtomicMetrics, ConnectionEvent, ConnectionManager, ConnectionManagerBuilder,
    ConnectionState, ConnectionStatus, EndpointConfig, InboundMessage, ManagerConfig, Metrics,
    ReconnectConfig, Subscription, TungsteniteConnector, TungsteniteTransport,
};
