use anyhow::{Context, Result};
use repairdesk::bin_common::{
    load_config_from_env, parse_args, print_banner, print_shutdown, ConfigType, RunConfig,
};
use std::path::PathBuf;
use storefront::{init_tracing, spawn_live_feed, FeedConfig, ShutdownManager};

#[tokio::main]
async fn main() -> Result<()> {
    // An explicit path argument wins over LIVE_FEED_CONFIG_PATH
    let config_path = match parse_args().into_iter().next() {
        Some(path) => PathBuf::from(path),
        None => load_config_from_env(ConfigType::LiveFeed),
    };

    // Load config first (before logging is initialized)
    let config = FeedConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    init_tracing(&config.log_level);
    config.log();

    let run = RunConfig::new("Repair Desk live feed")
        .with_detail("User", config.user_id.as_deref().unwrap_or("(anonymous)"))
        .with_detail("Stats interval", format!("{}s", config.stats_interval_secs));

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    print_banner(&run);

    let stats = spawn_live_feed(config, shutdown.clone())
        .await
        .context("live feed task failed")??;

    print_shutdown(
        &run,
        Some(&format!(
            "Notifications received: {} ({} reconnects)",
            stats.total(),
            stats.reconnects()
        )),
    );
    Ok(())
}
