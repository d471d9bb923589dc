use crate::core::config::{EndpointConfig, ManagerConfig, ReconnectConfig};
use crate::core::manager::ConnectionManager;
use crate::core::ws_transport::TungsteniteConnector;
use crate::traits::*;
use std::sync::Arc;
use tracing::warn;

/// Builder for [`ConnectionManager`]
///
/// Every field has a default, so `ConnectionManager::builder().build()`
/// yields a manager pointed at `ws://localhost:4000/ws` with the stock
/// backoff. The connector and strategy seams exist for tests and for
/// callers with their own transport.
pub struct ConnectionManagerBuilder {
    config: ManagerConfig,
    connector: Option<Arc<dyn Connector>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
}

impl ConnectionManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
            connector: None,
            reconnect_strategy: None,
        }
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    /// Host and optional port, with or without an `http(s)://` prefix
    pub fn api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.config.endpoint.api_base_url = api_base_url.into();
        self
    }

    /// Use `wss` instead of `ws`
    pub fn secure(mut self, secure: bool) -> Self {
        self.config.endpoint.secure = secure;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.endpoint.path = path.into();
        self
    }

    /// Backoff settings, used unless a custom strategy is given
    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.reconnect = reconnect;
        self
    }

    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Replace the configured exponential backoff
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    /// Spawn the manager's driver on the current runtime
    ///
    /// Never fails. An unusable endpoint surfaces as a construction failure
    /// on the first `connect`; with no runtime the manager is inert.
    pub fn build(self) -> ConnectionManager {
        if let Err(e) = self.config.validate() {
            warn!("Connection manager built with invalid configuration: {}", e);
        }

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TungsteniteConnector::new()));
        let strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(self.config.reconnect.strategy()));

        ConnectionManager::spawn(self.config, connector, strategy)
    }
}

impl Default for ConnectionManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
