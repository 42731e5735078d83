//! Per-source admission and heartbeat liveness against a running server.

use std::time::Duration;

use futures_util::StreamExt;
use state_sync::ServerEvent;
use tokio_tungstenite::connect_async;

mod common;

#[tokio::test]
async fn test_source_limit_refuses_with_policy_close() {
    let mut config = common::test_config();
    config.limits.max_connections_per_source = 1;
    let (server, addr) = common::start_server(config).await;

    let _first = common::connect(&server, addr).await;

    let (mut second, _) = connect_async(common::ws_url(&server, addr)).await.unwrap();
    let frame = common::recv_close(&mut second).await.expect("close frame");
    assert_eq!(u16::from(frame.code), 1008);

    assert_eq!(server.connection_count(), 1);
    assert_eq!(server.source_connections("127.0.0.1".parse().unwrap()), 1);

    server.close().await;
}

#[tokio::test]
async fn test_slot_freed_after_client_disconnects() {
    let mut config = common::test_config();
    config.limits.max_connections_per_source = 1;
    let (server, addr) = common::start_server(config).await;

    let mut first = common::connect(&server, addr).await;
    first.close(None).await.unwrap();
    common::wait_until(|| server.connection_count() == 0).await;
    assert!(server.would_admit("127.0.0.1".parse().unwrap()));

    let _again = common::connect(&server, addr).await;
    assert_eq!(server.connection_count(), 1);

    server.close().await;
}

#[tokio::test]
async fn test_unresponsive_client_is_evicted() {
    let mut config = common::test_config();
    config.heartbeat.interval_ms = 50;
    config.heartbeat.timeout_ms = 150;
    let (server, addr) = common::start_server(config).await;
    let mut events = server.subscribe();

    // never polled again, so WebSocket pings go unanswered
    let _silent = common::connect(&server, addr).await;
    let id = match events.recv().await.unwrap() {
        ServerEvent::ClientConnected { id } => id,
        other => panic!("unexpected event {:?}", other),
    };

    common::wait_until(|| server.connection_count() == 0).await;
    assert!(server.connection(id).is_none());
    assert_eq!(server.source_connections("127.0.0.1".parse().unwrap()), 0);

    server.close().await;
}

#[tokio::test]
async fn test_responsive_client_survives_sweeps() {
    let mut config = common::test_config();
    config.heartbeat.interval_ms = 50;
    config.heartbeat.timeout_ms = 150;
    let (server, addr) = common::start_server(config).await;

    let mut ws = common::connect(&server, addr).await;
    // polling the stream answers pings
    let reader = tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(server.connection_count(), 1);

    server.close().await;
    let _ = tokio::time::timeout(common::RECV_TIMEOUT, reader).await;
}
