//! Integration tests for connection lifecycle
//!
//! Connect idempotence, the send gate, inbound parsing, observation and
//! teardown. The last tests run against a real local socket.

mod common;

use common::{next_matching, next_matching_within, settle, MockWsServer, ScriptedConnector};
use serde_json::json;
use shopsocket::{
    ConnectionEvent, ConnectionManager, ConnectionState, InboundMessage, ManagerConfig,
    ReconnectConfig,
};
use std::time::Duration;

/// Macro for verbose test output
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

fn scripted_manager(connector: &ScriptedConnector) -> ConnectionManager {
    ConnectionManager::builder()
        .api_base_url("https://api.shop.test/")
        .secure(true)
        .connector(connector.clone())
        .build()
}

async fn connected(connector: &ScriptedConnector, identity: Option<&str>) -> ConnectionManager {
    let manager = scripted_manager(connector);
    let mut status = manager.status();
    manager.connect(identity);
    settle().await;
    connector.accept(connector.open_count() - 1);
    assert!(status.wait_for(ConnectionState::Connected).await);
    manager
}

#[tokio::test]
async fn test_initial_state() {
    let connector = ScriptedConnector::new();
    let manager = scripted_manager(&connector);

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(manager.latest_message().is_none());
    assert!(manager.is_active());
    assert_eq!(connector.open_count(), 0);
}

#[tokio::test]
async fn test_connect_builds_endpoint_from_config() {
    let connector = ScriptedConnector::new();
    let manager = scripted_manager(&connector);

    manager.connect(Some("tech #7"));
    settle().await;

    assert_eq!(manager.state(), ConnectionState::Connecting);
    assert_eq!(connector.url(0), "wss://api.shop.test/ws?userId=tech+%237");
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    verbose_println!("Testing repeated connect...");

    let connector = ScriptedConnector::new();
    let manager = scripted_manager(&connector);

    // while opening
    manager.connect(Some("a"));
    manager.connect(Some("b"));
    settle().await;
    assert_eq!(connector.open_count(), 1);

    // while open
    connector.accept(0);
    settle().await;
    manager.connect(Some("c"));
    settle().await;
    assert_eq!(connector.open_count(), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);

    // the ignored identities were not stored either
    manager.disconnect();
    manager.connect(None);
    settle().await;
    assert_eq!(connector.open_count(), 2);
    assert!(connector.url(1).ends_with("userId=a"));
}

#[tokio::test]
async fn test_send_while_disconnected_is_dropped() {
    let connector = ScriptedConnector::new();
    let manager = scripted_manager(&connector);
    let events = manager.events();

    manager.send(&json!({ "type": "ping" }));

    assert_eq!(events.try_recv(), Ok(ConnectionEvent::MessageDropped));
    assert_eq!(manager.metrics().messages_dropped, 1);

    // still dropped while the handshake is in flight
    manager.connect(None);
    settle().await;
    manager.send(&json!({ "type": "ping" }));
    settle().await;
    assert!(connector.writes(0).is_empty());
    assert_eq!(manager.metrics().messages_dropped, 2);
}

#[tokio::test]
async fn test_bounded_event_receiver_does_not_grow() {
    let connector = ScriptedConnector::new();
    let manager = scripted_manager(&connector);
    let bounded = manager.events_bounded(2);
    let unbounded = manager.events();

    for _ in 0..5 {
        manager.send(&json!({ "type": "ping" }));
    }

    assert_eq!(bounded.len(), 2);
    assert_eq!(unbounded.len(), 5);
    assert_eq!(manager.metrics().messages_dropped, 5);

    // draining makes room again
    bounded.try_iter().for_each(drop);
    manager.send(&json!({ "type": "ping" }));
    assert_eq!(bounded.try_recv(), Ok(ConnectionEvent::MessageDropped));
}

#[tokio::test]
async fn test_send_writes_json_when_connected() {
    let connector = ScriptedConnector::new();
    let manager = connected(&connector, None).await;

    manager.send(&json!({ "type": "subscribe", "data": { "channel": "tickets" } }));
    manager.send(&InboundMessage::new("ping"));
    settle().await;

    assert_eq!(
        connector.writes(0),
        vec![
            r#"{"type":"subscribe","data":{"channel":"tickets"}}"#.to_string(),
            r#"{"type":"ping"}"#.to_string(),
        ]
    );
    assert_eq!(manager.metrics().messages_sent, 2);
}

#[tokio::test]
async fn test_inbound_message_updates_latest() {
    let connector = ScriptedConnector::new();
    let manager = connected(&connector, Some("tech-7")).await;
    let mut messages = manager.watch_messages();

    connector.deliver(
        0,
        r#"{"type":"ticket_updated","data":{"id":42},"userId":"tech-7","timestamp":"2024-05-01T10:00:00Z"}"#,
    );
    messages.changed().await.unwrap();

    let latest = manager.latest_message().unwrap();
    assert_eq!(latest.kind, "ticket_updated");
    assert_eq!(latest.data, Some(json!({ "id": 42 })));
    assert_eq!(latest.user_id.as_deref(), Some("tech-7"));
    assert_eq!(latest.timestamp.as_deref(), Some("2024-05-01T10:00:00Z"));
    assert_eq!(manager.metrics().messages_received, 1);
}

#[tokio::test]
async fn test_malformed_input_is_discarded() {
    let connector = ScriptedConnector::new();
    let manager = connected(&connector, None).await;
    let events = manager.events();
    let mut messages = manager.watch_messages();

    connector.deliver(0, r#"{"type":"first"}"#);
    messages.changed().await.unwrap();

    connector.deliver(0, "not json at all");
    connector.deliver(0, r#"{"data":{"missing":"type"}}"#);

    next_matching(&events, |e| matches!(e, ConnectionEvent::MalformedMessage(_))).await;
    next_matching(&events, |e| matches!(e, ConnectionEvent::MalformedMessage(_))).await;

    assert_eq!(manager.latest_message().unwrap().kind, "first");
    assert_eq!(manager.metrics().messages_malformed, 2);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_status_follows_state() {
    let connector = ScriptedConnector::new();
    let manager = scripted_manager(&connector);
    let mut status = manager.status();

    manager.connect(None);
    assert!(status.wait_for(ConnectionState::Connecting).await);

    connector.accept(0);
    assert!(status.wait_for(ConnectionState::Connected).await);
    assert!(status.is_connected());

    manager.disconnect();
    assert!(status.wait_for(ConnectionState::Disconnected).await);
    assert!(connector.is_closed(0));
}

#[tokio::test]
async fn test_shutdown_closes_transport() {
    let connector = ScriptedConnector::new();
    let manager = connected(&connector, None).await;
    let mut status = manager.status();

    manager.shutdown().await;

    assert!(connector.is_closed(0));
    assert!(status.wait_for(ConnectionState::Disconnected).await);
    // the driver is gone, so no further changes are possible
    assert!(!status.changed().await);
}

#[test]
fn test_manager_without_runtime_is_inert() {
    let connector = ScriptedConnector::new();
    let manager = ConnectionManager::builder()
        .connector(connector.clone())
        .build();
    let events = manager.events();

    manager.connect(Some("tech-7"));
    manager.send(&json!({ "type": "ping" }));
    manager.disconnect();

    assert!(!manager.is_active());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(connector.open_count(), 0);
    assert!(events.try_recv().is_err());
}

fn local_config(server: &MockWsServer) -> ManagerConfig {
    let mut config = ManagerConfig::default();
    config.endpoint.api_base_url = server.api_base_url();
    config.reconnect = ReconnectConfig {
        max_attempts: 5,
        base_delay_ms: 50,
    };
    config
}

#[tokio::test]
async fn test_end_to_end_echo() {
    verbose_println!("Testing echo through a real socket...");

    let server = MockWsServer::start().await;
    let manager = ConnectionManager::new(local_config(&server));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = manager.on_message(move |msg| {
        let _ = tx.send(msg.clone());
    });

    manager.connect(Some("tech-7"));
    let mut status = manager.status();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(ConnectionState::Connected))
        .await
        .expect("connect timed out");

    manager.send(&json!({ "type": "echo", "data": { "n": 1 } }));

    let echoed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("echo timed out")
        .unwrap();
    verbose_println!("  Echoed: {:?}", echoed);
    assert_eq!(echoed.kind, "echo");
    assert_eq!(echoed.data, Some(json!({ "n": 1 })));
    assert_eq!(server.requests(), vec!["/ws?userId=tech-7".to_string()]);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_server_close_triggers_reconnect() {
    let server = MockWsServer::start().await;
    let manager = ConnectionManager::new(local_config(&server));
    let events = manager.events();

    manager.connect(Some("tech-7"));
    next_matching_within(&events, Duration::from_secs(5), |e| *e == ConnectionEvent::Connected)
        .await
        .expect("first connect timed out");

    server.kick_all();

    let closed = next_matching_within(&events, Duration::from_secs(5), |e| {
        matches!(e, ConnectionEvent::Disconnected { .. })
    })
    .await
    .expect("close never observed");
    assert_eq!(
        closed,
        ConnectionEvent::Disconnected {
            code: Some(1001),
            reason: "server restarting".to_string(),
        }
    );

    next_matching_within(&events, Duration::from_secs(5), |e| *e == ConnectionEvent::Connected)
        .await
        .expect("reconnect timed out");

    // identity survives the reconnect
    assert_eq!(
        server.requests(),
        vec!["/ws?userId=tech-7".to_string(), "/ws?userId=tech-7".to_string()]
    );
    assert_eq!(manager.metrics().reconnect_attempt, 0);

    manager.shutdown().await;
}
