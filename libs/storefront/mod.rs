//! Repair desk storefront services
//!
//! Application and infrastructure around the `shopsocket` connection
//! manager: configuration, logging, shutdown and the live notification feed.

pub mod application;
pub mod infrastructure;

pub use application::{run_live_feed, spawn_live_feed, FeedStats, NotificationLogger};
pub use infrastructure::{init_tracing, ConfigError, FeedConfig, ShutdownManager};
