//! Infrastructure Layer
//!
//! Configuration, logging and process lifecycle.

pub mod config;
pub mod logging;
pub mod shutdown;

pub use config::{ConfigError, FeedConfig};
pub use logging::init_tracing;
pub use shutdown::ShutdownManager;
