//! Application Layer
//!
//! Long-running flows built on the connection manager.

pub mod live_feed;

pub use live_feed::{run_live_feed, spawn_live_feed, FeedStats, NotificationLogger};
