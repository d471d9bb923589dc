//! Live notification feed
//!
//! Keeps a connection manager open for the configured technician, logs every
//! notification as it arrives and periodically reports per-type counters.

use crate::infrastructure::{FeedConfig, ShutdownManager};
use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shopsocket::{
    ConnectionEvent, ConnectionManager, ConnectionState, InboundMessage, MessageHandler,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const EVENT_BUFFER: usize = 1024;

/// Notification counters for one feed run
#[derive(Debug)]
pub struct FeedStats {
    started_at: DateTime<Utc>,
    total: AtomicU64,
    by_type: Mutex<BTreeMap<String, u64>>,
    reconnects: AtomicU64,
}

impl FeedStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            total: AtomicU64::new(0),
            by_type: Mutex::new(BTreeMap::new()),
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn record(&self, kind: &str) {
        self.total.fetch_add(1, Ordering::Relaxed);
        *self.by_type.lock().entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.by_type.lock().get(kind).copied().unwrap_or(0)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Per-type counts, sorted by type
    pub fn by_type(&self) -> Vec<(String, u64)> {
        self.by_type
            .lock()
            .iter()
            .map(|(kind, count)| (kind.clone(), *count))
            .collect()
    }

    pub fn summary(&self, state: ConnectionState) -> String {
        let uptime = Utc::now().signed_duration_since(self.started_at);
        let breakdown = self
            .by_type()
            .iter()
            .map(|(kind, count)| format!("{}={}", kind, count))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "state={} uptime={}s notifications={} reconnects={} [{}]",
            state,
            uptime.num_seconds(),
            self.total(),
            self.reconnects(),
            breakdown
        )
    }
}

impl Default for FeedStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber that logs and counts every notification
pub struct NotificationLogger {
    stats: Arc<FeedStats>,
}

impl NotificationLogger {
    pub fn new(stats: Arc<FeedStats>) -> Self {
        Self { stats }
    }
}

impl MessageHandler for NotificationLogger {
    fn handle(&self, message: &InboundMessage) -> shopsocket::Result<()> {
        self.stats.record(&message.kind);

        let user = message.user_id.as_deref().unwrap_or("-");
        match message.timestamp.as_deref().and_then(notification_lag) {
            Some(lag) => info!(
                "Notification '{}' for {} ({}ms after it was sent)",
                message.kind,
                user,
                lag.num_milliseconds()
            ),
            None => info!("Notification '{}' for {}", message.kind, user),
        }

        if let Some(data) = &message.data {
            debug!("  payload: {}", data);
        }
        Ok(())
    }
}

fn notification_lag(timestamp: &str) -> Option<chrono::Duration> {
    let sent = DateTime::parse_from_rfc3339(timestamp).ok()?;
    Some(Utc::now().signed_duration_since(sent.with_timezone(&Utc)))
}

fn log_event(event: &ConnectionEvent, stats: &FeedStats) {
    match event {
        ConnectionEvent::StateChanged(state) => info!("Connection state: {}", state),
        ConnectionEvent::ReconnectScheduled { attempt, delay, .. } => {
            stats.record_reconnect();
            info!("Reconnect {} scheduled in {:?}", attempt, delay);
        }
        ConnectionEvent::ReconnectExhausted { attempts } => {
            warn!("Gave up reconnecting after {} attempts; feed is offline", attempts)
        }
        ConnectionEvent::ConstructionFailed(reason) => {
            warn!("Could not open the feed socket: {}", reason)
        }
        ConnectionEvent::MalformedMessage(reason) => warn!("Discarded notification: {}", reason),
        ConnectionEvent::HandlerFailed(reason) => warn!("Notification handler failed: {}", reason),
        other => debug!("Connection event: {:?}", other),
    }
}

/// Run the feed until `shutdown` is triggered
///
/// Returns the counters collected over the run.
pub async fn run_live_feed(
    config: FeedConfig,
    shutdown: ShutdownManager,
) -> anyhow::Result<Arc<FeedStats>> {
    config.validate().context("invalid live feed configuration")?;

    let manager = ConnectionManager::new(config.connection.clone());
    let stats = Arc::new(FeedStats::new());
    let events = manager.events_bounded(EVENT_BUFFER);
    let _subscription = manager.subscribe(Arc::new(NotificationLogger::new(Arc::clone(&stats))));

    manager.connect(config.user_id.as_deref());

    let mut report = tokio::time::interval(Duration::from_secs(config.stats_interval_secs));
    // the first tick completes immediately
    report.tick().await;

    loop {
        let running = tokio::select! {
            running = shutdown.interruptible_sleep(EVENT_POLL_INTERVAL) => running,
            _ = report.tick() => {
                info!("Feed stats: {}", stats.summary(manager.state()));
                true
            }
        };

        for event in events.try_iter() {
            log_event(&event, &stats);
        }

        if !running {
            break;
        }
    }

    let final_state = manager.state();
    manager.disconnect();
    manager.shutdown().await;

    info!("Final feed stats: {}", stats.summary(final_state));
    Ok(stats)
}

/// Spawn [`run_live_feed`] on the current runtime
pub fn spawn_live_feed(
    config: FeedConfig,
    shutdown: ShutdownManager,
) -> JoinHandle<anyhow::Result<Arc<FeedStats>>> {
    tokio::spawn(run_live_feed(config, shutdown))
}
