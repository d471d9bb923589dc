use crate::error::{Result, ShopSocketError};
use crate::traits::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Configuration for a [`crate::ConnectionManager`]
///
/// Deserializable so applications can embed it directly in their own
/// configuration files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<()> {
        self.endpoint.validate()?;
        self.reconnect.validate()
    }
}

/// Where the notification socket lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// API base address, with or without an `http(s)://` prefix
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Use `wss://`. Set when the hosting application is itself served over https.
    #[serde(default)]
    pub secure: bool,

    /// Socket path on the API host
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_api_base_url() -> String {
    "localhost:4000".to_string()
}

fn default_path() -> String {
    "/ws".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            secure: false,
            path: default_path(),
        }
    }
}

impl EndpointConfig {
    /// Host part of the API base address
    pub fn host(&self) -> &str {
        strip_http_scheme(self.api_base_url.trim()).trim_end_matches('/')
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// Build the socket URL, attaching `userId` when an identity is known
    ///
    /// `{ws|wss}://{host}{path}[?userId={identity}]`
    pub fn url(&self, identity: Option<&str>) -> Result<Url> {
        // special schemes skip extra slashes, so "ws:///ws" would parse with host "ws"
        if self.host().is_empty() {
            return Err(ShopSocketError::InvalidEndpoint(format!(
                "no host in api base url '{}'",
                self.api_base_url
            )));
        }

        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        let mut url = Url::parse(&format!("{}://{}{}", self.scheme(), self.host(), path))?;
        if let Some(identity) = identity {
            url.query_pairs_mut().append_pair("userId", identity);
        }
        Ok(url)
    }

    fn validate(&self) -> Result<()> {
        self.url(None)
            .map(|_| ())
            .map_err(|e| ShopSocketError::Configuration(format!("api_base_url: {}", e)))
    }
}

fn strip_http_scheme(base: &str) -> &str {
    base.strip_prefix("https://")
        .or_else(|| base.strip_prefix("http://"))
        .unwrap_or(base)
}

/// Backoff tuning for unexpected closes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Reconnect attempts allowed between two successful opens
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay before the first attempt; doubles on each further attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> usize {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl ReconnectConfig {
    pub fn strategy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.base_delay_ms),
            Some(self.max_attempts),
        )
    }

    fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(ShopSocketError::Configuration(
                "base_delay_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
