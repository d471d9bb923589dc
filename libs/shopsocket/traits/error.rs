use thiserror::Error;

/// Main error type for shopsocket
///
/// None of these surface through the `ConnectionManager` public API, which
/// logs failures instead. They flow through the `Connector`, `Transport` and
/// `MessageHandler` seams.
#[derive(Error, Debug)]
pub enum ShopSocketError {
    /// Endpoint URL could not be built or parsed
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// WebSocket transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Inbound payload could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Outbound payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A subscriber failed while handling a message
    #[error("Handler error: {0}")]
    Handler(String),

    /// No async runtime available to drive the connection
    #[error("Runtime unavailable: {0}")]
    Runtime(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for ShopSocketError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            ShopSocketError::Parse(err.to_string())
        } else {
            ShopSocketError::Serialization(err.to_string())
        }
    }
}

impl From<url::ParseError> for ShopSocketError {
    fn from(err: url::ParseError) -> Self {
        ShopSocketError::InvalidEndpoint(err.to_string())
    }
}

/// Result type for shopsocket operations
pub type Result<T> = std::result::Result<T, ShopSocketError>;
