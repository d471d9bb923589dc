//! tokio-tungstenite transport
//!
//! Each transport is one spawned task owning the socket. The write half is
//! fed from an unbounded channel; everything read is forwarded to the
//! manager through [`TransportEvents`].

use crate::error::{Result, ShopSocketError};
use crate::traits::{Connector, Transport, TransportEvent, TransportEvents, WsMessage};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Outbound instruction for the socket task
#[derive(Debug)]
enum Outbound {
    Frame(Message),
    Close,
}

/// Production [`Connector`] backed by `tokio_tungstenite::connect_async`
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for TungsteniteConnector {
    fn open(&self, url: &Url, events: TransportEvents) -> Result<Box<dyn Transport>> {
        let request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ShopSocketError::InvalidEndpoint(e.to_string()))?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ShopSocketError::Runtime(e.to_string()))?;

        let (outbound_tx, outbound_rx) = unbounded_channel();
        runtime.spawn(run_socket(request, outbound_rx, events));

        Ok(Box::new(TungsteniteTransport {
            outbound: outbound_tx,
        }))
    }
}

/// Handle to a socket task
///
/// Dropping the handle closes the socket: the task sees its outbound channel
/// end and shuts down, even mid-handshake.
pub struct TungsteniteTransport {
    outbound: UnboundedSender<Outbound>,
}

impl Transport for TungsteniteTransport {
    fn send(&mut self, text: String) -> Result<()> {
        self.outbound
            .send(Outbound::Frame(Message::Text(text)))
            .map_err(|_| ShopSocketError::ConnectionClosed("socket task has exited".into()))
    }

    fn close(&mut self) {
        // Err means the task already exited
        let _ = self.outbound.send(Outbound::Close);
    }
}

async fn run_socket(
    request: Request,
    mut outbound: UnboundedReceiver<Outbound>,
    events: TransportEvents,
) {
    let uri = request.uri().to_string();

    let ws_stream = tokio::select! {
        result = connect_async(request) => match result {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                warn!("Failed to connect to {}: {}", uri, e);
                events.emit(TransportEvent::Error(e.to_string()));
                events.emit(TransportEvent::Closed {
                    code: None,
                    reason: "connection failed".into(),
                });
                return;
            }
        },
        // transport released before the handshake finished
        _ = wait_for_close(&mut outbound) => {
            debug!("Transport to {} closed during handshake", uri);
            events.emit(TransportEvent::Closed {
                code: None,
                reason: "closed before open".into(),
            });
            return;
        }
    };

    info!("Connected to {}", uri);
    if !events.emit(TransportEvent::Opened) {
        return;
    }

    let (code, reason) = message_loop(ws_stream, &mut outbound, &events).await;
    debug!("Socket to {} finished: code={:?} reason='{}'", uri, code, reason);
    events.emit(TransportEvent::Closed { code, reason });
}

/// Resolves when the manager asks for a close (or drops the handle)
async fn wait_for_close(outbound: &mut UnboundedReceiver<Outbound>) {
    loop {
        match outbound.recv().await {
            Some(Outbound::Close) | None => return,
            // nothing can be written before the socket opens
            Some(Outbound::Frame(_)) => continue,
        }
    }
}

async fn message_loop(
    ws_stream: WsStream,
    outbound: &mut UnboundedReceiver<Outbound>,
    events: &TransportEvents,
) -> (Option<u16>, String) {
    let (mut write, mut read) = ws_stream.split();
    let mut close_frame: Option<(u16, String)> = None;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        events.emit(TransportEvent::Message(WsMessage::Text(text)));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        events.emit(TransportEvent::Message(WsMessage::Binary(data)));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(frame) = frame {
                            let code: u16 = frame.code.into();
                            info!("Server closed connection: code={}, reason='{}'", code, frame.reason);
                            close_frame = Some((code, frame.reason.to_string()));
                        } else {
                            warn!("Server closed connection without close frame");
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        events.emit(TransportEvent::Error(e.to_string()));
                        return close_frame
                            .map(|(code, reason)| (Some(code), reason))
                            .unwrap_or((None, e.to_string()));
                    }
                    None => {
                        return close_frame
                            .map(|(code, reason)| (Some(code), reason))
                            .unwrap_or((None, "stream ended".into()));
                    }
                }
            }

            cmd = outbound.recv() => {
                match cmd {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = write.send(frame).await {
                            warn!("Failed to write frame: {}", e);
                            events.emit(TransportEvent::Error(e.to_string()));
                            return (None, e.to_string());
                        }
                    }
                    Some(Outbound::Close) | None => {
                        debug!("Closing socket on request");
                        let _ = write.close().await;
                        return (Some(1000), "closed by client".into());
                    }
                }
            }
        }
    }
}
