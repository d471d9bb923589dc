use crate::core::builder::ConnectionManagerBuilder;
use crate::core::config::ManagerConfig;
use crate::core::connection_state::{AtomicMetrics, ConnectionState, Metrics};
use crate::core::events::{ConnectionEvent, EventBus};
use crate::core::message::InboundMessage;
use crate::core::registry::{HandlerRegistry, Subscription};
use crate::core::status::ConnectionStatus;
use crate::traits::transport::TransportSignal;
use crate::traits::*;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Commands from the manager handle to its driver
#[derive(Debug)]
enum ManagerCommand {
    /// Open a transport unless one is already active
    Connect(Option<String>),
    /// Close the transport and stop reconnecting
    Disconnect,
    /// Write a serialized message
    Send(String),
    /// Tear everything down and stop the driver
    Shutdown,
}

/// State shared between the manager handle and its driver
struct Shared {
    state_tx: watch::Sender<ConnectionState>,
    latest_tx: watch::Sender<Option<InboundMessage>>,
    registry: Arc<HandlerRegistry>,
    events: EventBus,
    metrics: AtomicMetrics,
}

impl Shared {
    fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (latest_tx, _) = watch::channel(None);
        Self {
            state_tx,
            latest_tx,
            registry: Arc::new(HandlerRegistry::new()),
            events: EventBus::new(),
            metrics: AtomicMetrics::new(),
        }
    }

    #[inline]
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        if changed {
            debug!("Connection state -> {}", state);
            self.events.emit(ConnectionEvent::StateChanged(state));
        }
    }

    fn record_dropped_send(&self) {
        warn!("Not connected, dropping outbound message");
        self.metrics.increment_dropped();
        self.events.emit(ConnectionEvent::MessageDropped);
    }
}

/// Resilient client for the shop's live notification socket
///
/// One manager owns at most one transport at a time. It reconnects with
/// exponential backoff after unexpected closes, publishes its state and the
/// latest inbound message through watch channels, and fans every valid
/// inbound message out to registered handlers.
///
/// All mutation happens on a single driver task. The methods on this type
/// only enqueue commands, so none of them block and none of them fail:
/// problems are logged and reported on the [`ConnectionEvent`] stream.
///
/// Constructed outside a tokio runtime, the manager is inert and every
/// operation is a no-op.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(ManagerConfig::default());
/// let _sub = manager.on_message(|msg| println!("{}", msg.kind));
///
/// manager.connect(Some("tech-7"));
/// manager.status().wait_for(ConnectionState::Connected).await;
/// manager.send(&serde_json::json!({ "type": "ping" }));
/// ```
pub struct ConnectionManager {
    shared: Arc<Shared>,
    /// `None` when no runtime was available at construction
    command_tx: Option<UnboundedSender<ManagerCommand>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ConnectionManager {
    /// Manager using the tungstenite transport and the configured backoff
    pub fn new(config: ManagerConfig) -> Self {
        ConnectionManagerBuilder::new().config(config).build()
    }

    pub fn builder() -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new()
    }

    pub(crate) fn spawn(
        config: ManagerConfig,
        connector: Arc<dyn Connector>,
        strategy: Box<dyn ReconnectionStrategy>,
    ) -> Self {
        let shared = Arc::new(Shared::new());

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                debug!("No tokio runtime available, connection manager is inert");
                return Self {
                    shared,
                    command_tx: None,
                    task_handle: None,
                };
            }
        };

        let (command_tx, command_rx) = unbounded_channel();
        let (signal_tx, signal_rx) = unbounded_channel();

        let driver = Driver {
            config,
            connector,
            strategy,
            shared: Arc::clone(&shared),
            signal_tx,
            transport: None,
            next_transport_id: 0,
            identity: None,
            attempts: 0,
            retry: None,
        };

        let task_handle = runtime.spawn(driver.run(command_rx, signal_rx));

        Self {
            shared,
            command_tx: Some(command_tx),
            task_handle: Some(task_handle),
        }
    }

    fn command(&self, command: ManagerCommand) {
        match &self.command_tx {
            Some(tx) => {
                if tx.send(command).is_err() {
                    debug!("Connection manager driver has stopped, command ignored");
                }
            }
            None => debug!("Connection manager is inert, ignoring {:?}", command),
        }
    }

    /// Open the connection
    ///
    /// No-op while a transport is open or opening. A `Some` identity replaces
    /// the stored one; `None` keeps whatever was stored before. The identity
    /// is reused for every automatic reconnect.
    pub fn connect(&self, identity: Option<&str>) {
        self.command(ManagerCommand::Connect(identity.map(str::to_owned)));
    }

    /// Close the connection and cancel any pending reconnect
    ///
    /// Automatic reconnection stays off until the next [`connect`](Self::connect).
    pub fn disconnect(&self) {
        self.command(ManagerCommand::Disconnect);
    }

    /// Serialize `message` to JSON and write it as a text frame
    ///
    /// Dropped with a diagnostic when not connected. Never queued for later.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) {
        if self.command_tx.is_none() {
            debug!("Connection manager is inert, ignoring send");
            return;
        }

        if !self.shared.state().is_connected() {
            self.shared.record_dropped_send();
            return;
        }

        match serde_json::to_string(message) {
            Ok(text) => self.command(ManagerCommand::Send(text)),
            Err(e) => error!("Failed to serialize outbound message: {}", e),
        }
    }

    /// Register a closure for every inbound message
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnHandler(handler)))
    }

    /// Register a handler for every inbound message
    ///
    /// Subscribing the same `Arc` again is a no-op that returns a
    /// subscription to the existing entry.
    pub fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> Subscription {
        let id = self.shared.registry.insert(handler);
        Subscription::new(id, &self.shared.registry)
    }

    pub fn handler_count(&self) -> usize {
        self.shared.registry.len()
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.shared.state().is_connected()
    }

    /// `false` for a manager built outside a runtime
    pub fn is_active(&self) -> bool {
        self.command_tx.is_some()
    }

    /// Most recent valid inbound message
    pub fn latest_message(&self) -> Option<InboundMessage> {
        self.shared.latest_tx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn watch_messages(&self) -> watch::Receiver<Option<InboundMessage>> {
        self.shared.latest_tx.subscribe()
    }

    /// Read-only handle for consumers that should not drive the connection
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::new(self.watch_state(), self.watch_messages())
    }

    /// Subscribe to structured connection events
    ///
    /// Each call returns an independent receiver that sees every event
    /// emitted from now on. The receiver is unbounded: events queue up until
    /// they are read or the receiver is dropped. Long-lived consumers that
    /// may fall behind should use [`ConnectionManager::events_bounded`].
    pub fn events(&self) -> crossbeam_channel::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Like [`ConnectionManager::events`], holding at most `capacity` events
    ///
    /// Events emitted while the receiver is full are lost for this receiver
    /// only.
    pub fn events_bounded(
        &self,
        capacity: usize,
    ) -> crossbeam_channel::Receiver<ConnectionEvent> {
        self.shared.events.subscribe_bounded(capacity)
    }

    pub fn metrics(&self) -> Metrics {
        self.shared.metrics.snapshot(self.shared.state())
    }

    /// Dispose of the manager
    ///
    /// Closes the transport, cancels any pending reconnect and waits for the
    /// driver task to finish.
    pub async fn shutdown(mut self) {
        info!("Shutting down connection manager");
        self.command(ManagerCommand::Shutdown);

        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                warn!("Connection manager driver ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(tx) = &self.command_tx {
            let _ = tx.send(ManagerCommand::Shutdown);
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("handlers", &self.handler_count())
            .field("active", &self.is_active())
            .finish()
    }
}

struct ActiveTransport {
    id: u64,
    handle: Box<dyn Transport>,
    open: bool,
}

struct PendingRetry {
    deadline: Instant,
    attempt: usize,
}

/// Owns every piece of mutable connection state
struct Driver {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    strategy: Box<dyn ReconnectionStrategy>,
    shared: Arc<Shared>,
    signal_tx: UnboundedSender<TransportSignal>,
    transport: Option<ActiveTransport>,
    next_transport_id: u64,
    identity: Option<String>,
    /// Reconnect attempts since the last successful open
    attempts: usize,
    retry: Option<PendingRetry>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: UnboundedReceiver<ManagerCommand>,
        mut signals: UnboundedReceiver<TransportSignal>,
    ) {
        debug!("Connection manager driver started");

        loop {
            let retry_deadline = self.retry.as_ref().map(|retry| retry.deadline);

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(ManagerCommand::Shutdown) | None => {
                        self.teardown();
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(signal) = signals.recv() => self.handle_signal(signal),
                _ = retry_timer(retry_deadline) => self.fire_retry(),
            }
        }

        debug!("Connection manager driver exiting");
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Connect(identity) => self.connect(identity),
            ManagerCommand::Disconnect => self.disconnect(),
            ManagerCommand::Send(text) => self.send(text),
            ManagerCommand::Shutdown => self.teardown(),
        }
    }

    fn connect(&mut self, identity: Option<String>) {
        if let Some(active) = &self.transport {
            if active.open {
                debug!("Already connected, ignoring connect");
            } else {
                debug!("Connection attempt in progress, ignoring connect");
            }
            return;
        }

        if identity.is_some() {
            self.identity = identity;
        }

        // an explicit connect supersedes any pending backoff and re-arms the budget
        self.cancel_retry();
        self.set_attempts(0);
        self.open_transport();
    }

    fn disconnect(&mut self) {
        self.cancel_retry();

        if let Some(mut active) = self.transport.take() {
            info!("Disconnecting transport #{}", active.id);
            active.handle.close();
            self.shared.events.emit(ConnectionEvent::Disconnected {
                code: Some(1000),
                reason: "disconnect requested".into(),
            });
        }

        self.shared.set_state(ConnectionState::Disconnected);
    }

    fn send(&mut self, text: String) {
        let connected = self.shared.state().is_connected();

        match self.transport.as_mut() {
            Some(active) if active.open && connected => match active.handle.send(text) {
                Ok(()) => self.shared.metrics.increment_sent(),
                Err(e) => warn!("Failed to send message: {}", e),
            },
            _ => self.shared.record_dropped_send(),
        }
    }

    fn teardown(&mut self) {
        self.cancel_retry();
        if let Some(mut active) = self.transport.take() {
            active.handle.close();
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    fn open_transport(&mut self) {
        self.shared.set_state(ConnectionState::Connecting);

        let url = match self.config.endpoint.url(self.identity.as_deref()) {
            Ok(url) => url,
            Err(e) => return self.construction_failed(e),
        };

        self.next_transport_id += 1;
        let id = self.next_transport_id;
        let events = TransportEvents::new(id, self.signal_tx.clone());

        info!("Connecting to {} (transport #{})", url, id);
        self.shared.events.emit(ConnectionEvent::Connecting {
            url: url.to_string(),
        });

        match self.connector.open(&url, events) {
            Ok(handle) => {
                self.transport = Some(ActiveTransport {
                    id,
                    handle,
                    open: false,
                });
            }
            Err(e) => self.construction_failed(e),
        }
    }

    /// No close event can follow, so this is a dead end until `connect`
    fn construction_failed(&mut self, e: ShopSocketError) {
        error!("Failed to create transport: {}", e);
        self.shared.set_state(ConnectionState::Error);
        self.shared
            .events
            .emit(ConnectionEvent::ConstructionFailed(e.to_string()));
    }

    fn handle_signal(&mut self, signal: TransportSignal) {
        let TransportSignal {
            transport_id,
            event,
        } = signal;

        let is_current = matches!(&self.transport, Some(active) if active.id == transport_id);
        if !is_current {
            trace!("Ignoring event from stale transport #{}", transport_id);
            return;
        }

        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Message(frame) => self.on_frame(frame),
            TransportEvent::Error(reason) => {
                warn!("Transport error: {}", reason);
                self.shared.set_state(ConnectionState::Error);
                self.shared.events.emit(ConnectionEvent::Error(reason));
            }
            TransportEvent::Closed { code, reason } => self.on_close(code, reason),
        }
    }

    fn on_open(&mut self) {
        if let Some(active) = self.transport.as_mut() {
            active.open = true;
            info!("Transport #{} connected", active.id);
        }

        self.set_attempts(0);
        self.strategy.reset();
        self.shared.set_state(ConnectionState::Connected);
        self.shared.events.emit(ConnectionEvent::Connected);
    }

    fn on_frame(&mut self, frame: WsMessage) {
        self.shared.metrics.increment_received();

        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Binary(data) => {
                warn!("Dropping binary frame ({} bytes)", data.len());
                self.shared.metrics.increment_malformed();
                self.shared
                    .events
                    .emit(ConnectionEvent::MalformedMessage("binary frame".into()));
                return;
            }
        };

        let message = match InboundMessage::parse(&text) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to parse message: {} - Raw: {}", e, text);
                self.shared.metrics.increment_malformed();
                self.shared
                    .events
                    .emit(ConnectionEvent::MalformedMessage(e.to_string()));
                return;
            }
        };

        debug!("Received '{}' message", message.kind);
        self.shared.latest_tx.send_replace(Some(message.clone()));

        for (id, reason) in self.shared.registry.dispatch(&message) {
            self.shared
                .events
                .emit(ConnectionEvent::HandlerFailed(format!("handler #{}: {}", id, reason)));
        }
    }

    fn on_close(&mut self, code: Option<u16>, reason: String) {
        self.transport = None;
        warn!("Connection closed: code={:?}, reason='{}'", code, reason);

        self.shared.set_state(ConnectionState::Disconnected);
        self.shared
            .events
            .emit(ConnectionEvent::Disconnected { code, reason });

        match self.strategy.next_delay(self.attempts) {
            Some(delay) => {
                let attempt = self.attempts + 1;
                self.set_attempts(attempt);
                self.shared.metrics.increment_reconnects();

                info!("Reconnecting in {:?} (attempt {})", delay, attempt);
                self.retry = Some(PendingRetry {
                    deadline: Instant::now() + delay,
                    attempt,
                });
                self.shared.events.emit(ConnectionEvent::ReconnectScheduled {
                    attempt,
                    delay,
                    identity: self.identity.clone(),
                });
            }
            None => {
                warn!(
                    "Reconnection strategy exhausted after {} attempts, staying disconnected",
                    self.attempts
                );
                self.shared.events.emit(ConnectionEvent::ReconnectExhausted {
                    attempts: self.attempts,
                });
            }
        }
    }

    fn fire_retry(&mut self) {
        let Some(retry) = self.retry.take() else {
            return;
        };

        if self.transport.is_some() {
            debug!(
                "Transport already active, skipping reconnect attempt {}",
                retry.attempt
            );
            return;
        }

        info!("Reconnect attempt {}", retry.attempt);
        self.shared.events.emit(ConnectionEvent::Reconnecting {
            attempt: retry.attempt,
        });
        self.open_transport();
    }

    fn cancel_retry(&mut self) {
        if let Some(retry) = self.retry.take() {
            debug!("Cancelled pending reconnect attempt {}", retry.attempt);
        }
    }

    fn set_attempts(&mut self, attempts: usize) {
        self.attempts = attempts;
        self.shared.metrics.set_reconnect_attempt(attempts);
    }
}

async fn retry_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
