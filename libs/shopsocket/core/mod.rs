//! Connection manager internals
//!
//! The manager itself is a thin handle around a driver task; everything
//! here is either state that task publishes or a piece it is built from.

pub mod builder;
pub mod config;
pub mod connection_state;
pub mod events;
pub mod manager;
pub mod message;
pub mod registry;
pub mod status;
pub mod ws_transport;

pub use builder::ConnectionManagerBuilder;
pub use config::{EndpointConfig, ManagerConfig, ReconnectConfig};
pub use connection_state::{AtomicMetrics, ConnectionState, Metrics};
pub use events::ConnectionEvent;
pub use manager::ConnectionManager;
pub use message::InboundMessage;
pub use registry::Subscription;
pub use status::ConnectionStatus;
pub use ws_transport::{TungsteniteConnector, TungsteniteTransport};
