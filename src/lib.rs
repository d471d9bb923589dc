//! Repair Desk - Main Library
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//! - **storefront**: Application services (re-exported from workspace)
//! - **shopsocket**: WebSocket connection manager (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use repairdesk::bin_common::{load_config_from_env, ConfigType};
//! use repairdesk::storefront::FeedConfig;
//! ```

// Re-export workspace libraries for convenience
pub use shopsocket;
pub use storefront;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use runner::{print_banner, print_shutdown, RunConfig};
}
