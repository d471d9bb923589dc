use serde::{Deserialize, Serialize};
use shopsocket::ManagerConfig;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid environment variable {name}: {reason}")]
    EnvVarInvalid { name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Live feed configuration
///
/// ```yaml
/// connection:
///   endpoint:
///     api_base_url: "api.repairdesk.local:4000"
///     secure: false
///   reconnect:
///     max_attempts: 5
///     base_delay_ms: 1000
/// user_id: "tech-7"
/// log_level: "info"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub connection: ManagerConfig,

    /// Identity sent as `userId` on every (re)connect
    #[serde(default)]
    pub user_id: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How often the feed logs its counters
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stats_interval() -> u64 {
    60
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            connection: ManagerConfig::default(),
            user_id: None,
            log_level: default_log_level(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

impl FeedConfig {
    /// Load configuration from YAML file and .env
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&yaml_content)?;

        dotenv::dotenv().ok();
        config.apply_overrides(|name| std::env::var(name).ok())?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply `API_BASE_URL`, `WS_SECURE` and `FEED_USER_ID` overrides
    ///
    /// `lookup` resolves a variable name to its value; `load` passes the
    /// process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base_url) = lookup("API_BASE_URL") {
            info!("Overriding API base URL from environment variable");
            self.connection.endpoint.api_base_url = api_base_url;
        }

        if let Some(secure) = lookup("WS_SECURE") {
            self.connection.endpoint.secure = parse_flag(&secure).ok_or_else(|| {
                ConfigError::EnvVarInvalid {
                    name: "WS_SECURE".to_string(),
                    reason: format!("expected true/false, got '{}'", secure),
                }
            })?;
        }

        if let Some(user_id) = lookup("FEED_USER_ID") {
            let user_id = user_id.trim();
            self.user_id = (!user_id.is_empty()).then(|| user_id.to_string());
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.connection
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.stats_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "stats_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Log configuration summary
    pub fn log(&self) {
        let endpoint = &self.connection.endpoint;
        let reconnect = &self.connection.reconnect;

        info!("Configuration loaded:");
        info!("  API base URL: {}", endpoint.api_base_url);
        info!("  Socket: {}://{}{}", endpoint.scheme(), endpoint.host(), endpoint.path);
        info!("  User: {}", self.user_id.as_deref().unwrap_or("(anonymous)"));
        info!(
            "  Reconnect: {} attempts, {}ms base delay",
            reconnect.max_attempts, reconnect.base_delay_ms
        );
        info!("  Stats interval: {} seconds", self.stats_interval_secs);
        info!("  Log level: {}", self.log_level);
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
