//! Common test utilities for ShopSocket integration tests
//!
//! Two kinds of fixture live here: a real echo server for end-to-end tests,
//! and a scripted connector that lets a test play the transport by hand.

#![allow(dead_code)]

use parking_lot::Mutex;
use shopsocket::{
    ConnectionEvent, Connector, ShopSocketError, Transport, TransportEvent, TransportEvents,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use url::Url;

/// A mock notification server
///
/// Echoes every text frame back to the sender and records the request path
/// (with query) of every accepted handshake.
pub struct MockWsServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    kick: Arc<Notify>,
    shutdown: Arc<Notify>,
}

impl MockWsServer {
    /// Create and start a new mock server on an ephemeral port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let kick = Arc::new(Notify::new());
        let shutdown = Arc::new(Notify::new());

        let accept_requests = requests.clone();
        let accept_kick = kick.clone();
        let accept_shutdown = shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let requests = accept_requests.clone();
                                let kick = accept_kick.clone();
                                let shutdown = accept_shutdown.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, requests, kick, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = accept_shutdown.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            requests,
            kick,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        requests: Arc<Mutex<Vec<String>>>,
        kick: Arc<Notify>,
        shutdown: Arc<Notify>,
    ) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_hdr_async;
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
        use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
        use tokio_tungstenite::tungstenite::protocol::CloseFrame;
        use tokio_tungstenite::tungstenite::Message;

        let record = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            requests.lock().push(req.uri().to_string());
            Ok(resp)
        };

        let ws_stream = match accept_hdr_async(stream, record).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            if msg.is_text() || msg.is_binary() {
                                // Echo the message back
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            } else if msg.is_close() {
                                break;
                            }
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                _ = kick.notified() => {
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: "server restarting".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    break;
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// `host:port`, the form the manager expects as its API base URL
    pub fn api_base_url(&self) -> String {
        self.addr.to_string()
    }

    /// Request targets seen so far, e.g. `/ws?userId=tech-7`
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Close every live connection with a 1001 close frame
    pub fn kick_all(&self) {
        self.kick.notify_waiters();
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Everything the manager handed to one scripted transport
pub struct ScriptedTransportRecord {
    pub url: String,
    pub events: TransportEvents,
    pub writes: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

#[derive(Default)]
struct ScriptState {
    transports: Vec<ScriptedTransportRecord>,
    fail_construction: bool,
}

/// Connector whose transports do nothing until the test says so
///
/// Clones share state, so a test keeps one clone and gives another to the
/// manager builder.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `open` fail synchronously
    pub fn fail_construction(&self, fail: bool) {
        self.state.lock().fail_construction = fail;
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().transports.len()
    }

    pub fn url(&self, index: usize) -> String {
        self.state.lock().transports[index].url.clone()
    }

    pub fn writes(&self, index: usize) -> Vec<String> {
        self.state.lock().transports[index].writes.lock().clone()
    }

    pub fn is_closed(&self, index: usize) -> bool {
        self.state.lock().transports[index].closed.load(Ordering::SeqCst)
    }

    fn emit(&self, index: usize, event: TransportEvent) {
        let events = self.state.lock().transports[index].events.clone();
        events.emit(event);
    }

    /// Complete the handshake of transport `index`
    pub fn accept(&self, index: usize) {
        self.emit(index, TransportEvent::Opened);
    }

    /// Deliver a text frame on transport `index`
    pub fn deliver(&self, index: usize, text: &str) {
        self.emit(
            index,
            TransportEvent::Message(shopsocket::WsMessage::Text(text.to_string())),
        );
    }

    pub fn fail(&self, index: usize, reason: &str) {
        self.emit(index, TransportEvent::Error(reason.to_string()));
    }

    /// Close transport `index` from the remote side
    pub fn drop_connection(&self, index: usize, code: u16) {
        self.emit(
            index,
            TransportEvent::Closed {
                code: Some(code),
                reason: "scripted close".to_string(),
            },
        );
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, url: &Url, events: TransportEvents) -> shopsocket::Result<Box<dyn Transport>> {
        let mut state = self.state.lock();
        if state.fail_construction {
            return Err(ShopSocketError::Transport(
                "scripted construction failure".to_string(),
            ));
        }

        let writes = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        state.transports.push(ScriptedTransportRecord {
            url: url.to_string(),
            events,
            writes: writes.clone(),
            closed: closed.clone(),
        });

        Ok(Box::new(ScriptedTransport { writes, closed }))
    }
}

struct ScriptedTransport {
    writes: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl Transport for ScriptedTransport {
    fn send(&mut self, text: String) -> shopsocket::Result<()> {
        self.writes.lock().push(text);
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Let spawned tasks run without letting paused time move
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Drain events until one matches, yielding to the driver in between
///
/// Never sleeps, so it is safe under a paused clock.
pub async fn next_matching<F>(
    rx: &crossbeam_channel::Receiver<ConnectionEvent>,
    mut matches: F,
) -> ConnectionEvent
where
    F: FnMut(&ConnectionEvent) -> bool,
{
    for _ in 0..1_000 {
        while let Ok(event) = rx.try_recv() {
            if matches(&event) {
                return event;
            }
        }
        tokio::task::yield_now().await;
    }
    panic!("expected connection event never arrived");
}

/// Like [`next_matching`] but waits on real time, for tests with real sockets
pub async fn next_matching_within<F>(
    rx: &crossbeam_channel::Receiver<ConnectionEvent>,
    timeout: std::time::Duration,
    mut matches: F,
) -> Option<ConnectionEvent>
where
    F: FnMut(&ConnectionEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        while let Ok(event) = rx.try_recv() {
            if matches(&event) {
                return Some(event);
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    None
}

/// Drain whatever events are queued right now
pub fn drain(rx: &crossbeam_channel::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    rx.try_iter().collect()
}
