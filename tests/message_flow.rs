//! End-to-end message handling over a real socket.

use std::time::Duration;

use serde_json::json;
use state_sync::{MessageType, ServerEvent};
use tokio_tungstenite::tungstenite::Message;
use futures_util::SinkExt;

mod common;

#[tokio::test]
async fn test_ping_answered_with_pong() {
    let (server, addr) = common::start_server(common::test_config()).await;
    let mut ws = common::connect(&server, addr).await;

    common::send_json(&mut ws, common::envelope("p-1", "PING", json!({}))).await;
    let reply = common::recv_json(&mut ws).await;

    assert_eq!(reply["type"], "PONG");
    assert_eq!(reply["timestamp"], 1_700_000_000_000u64);
    assert!(reply["id"].is_string());

    server.close().await;
}

#[tokio::test]
async fn test_pong_echoes_fractional_timestamp() {
    let (server, addr) = common::start_server(common::test_config()).await;
    let mut ws = common::connect(&server, addr).await;

    common::send_text(&mut ws, r#"{"id":"p1","type":"PING","timestamp":1234.5}"#).await;
    let reply = common::recv_json(&mut ws).await;

    assert_eq!(reply["type"], "PONG");
    assert_eq!(reply["timestamp"].as_f64(), Some(1234.5));

    server.close().await;
}

#[tokio::test]
async fn test_state_update_reaches_subscribers_without_reply() {
    let (server, addr) = common::start_server(common::test_config()).await;
    let mut events = server.subscribe();
    let mut ws = common::connect(&server, addr).await;

    common::send_json(
        &mut ws,
        common::envelope("u-1", "STATE_UPDATE", json!({ "cursor": 42 })),
    )
    .await;

    let envelope = loop {
        match tokio::time::timeout(common::RECV_TIMEOUT, events.recv())
            .await
            .expect("event expected")
            .unwrap()
        {
            ServerEvent::Message { envelope, .. } => break envelope,
            _ => continue,
        }
    };
    assert_eq!(envelope.kind(), MessageType::StateUpdate);
    assert_eq!(envelope.id.as_deref(), Some("u-1"));
    assert_eq!(envelope.message.payload()["cursor"], 42);

    common::assert_silent(&mut ws, Duration::from_millis(100)).await;
    server.close().await;
}

#[tokio::test]
async fn test_invalid_messages_are_nacked_and_not_published() {
    let (server, addr) = common::start_server(common::test_config()).await;
    let mut events = server.subscribe();
    let mut ws = common::connect(&server, addr).await;

    common::send_text(&mut ws, "not json").await;
    let nack = common::recv_json(&mut ws).await;
    assert_eq!(nack["type"], "NACK");
    assert!(nack["id"].is_null());
    assert_eq!(nack["payload"]["code"], "INVALID_MESSAGE");

    common::send_json(&mut ws, common::envelope("bad-1", "BOGUS", json!({}))).await;
    let nack = common::recv_json(&mut ws).await;
    assert_eq!(nack["id"], "bad-1");
    assert_eq!(nack["payload"]["code"], "INVALID_MESSAGE");
    assert!(!nack["payload"]["reason"].as_str().unwrap().is_empty());

    common::send_json(&mut ws, json!({ "id": "bad-2", "type": "STATE_UPDATE", "timestamp": 1 })).await;
    let nack = common::recv_json(&mut ws).await;
    assert_eq!(nack["id"], "bad-2");

    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, ServerEvent::Message { .. }),
            "invalid input must not be published"
        );
    }

    // still open after rejections
    assert_eq!(server.connection_count(), 1);
    server.close().await;
}

#[tokio::test]
async fn test_binary_frame_rejected() {
    let (server, addr) = common::start_server(common::test_config()).await;
    let mut ws = common::connect(&server, addr).await;

    ws.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    let nack = common::recv_json(&mut ws).await;
    assert_eq!(nack["type"], "NACK");
    assert_eq!(nack["payload"]["code"], "INVALID_MESSAGE");

    server.close().await;
}

#[tokio::test]
async fn test_oversized_message_rejected() {
    let mut config = common::test_config();
    config.listener.max_message_bytes = 128;
    let (server, addr) = common::start_server(config).await;
    let mut ws = common::connect(&server, addr).await;

    let blob = "x".repeat(512);
    common::send_json(
        &mut ws,
        common::envelope("big-1", "STATE_UPDATE", json!({ "blob": blob })),
    )
    .await;
    let nack = common::recv_json(&mut ws).await;
    assert_eq!(nack["payload"]["code"], "PAYLOAD_TOO_LARGE");

    server.close().await;
}

#[tokio::test]
async fn test_rate_limit_nacks_excess_messages() {
    let mut config = common::test_config();
    config.limits.max_messages_per_window = 3;
    config.limits.window_ms = 60_000;
    let (server, addr) = common::start_server(config).await;
    let mut ws = common::connect(&server, addr).await;

    for i in 0..4 {
        common::send_json(&mut ws, common::envelope(&format!("p-{}", i), "PING", json!({}))).await;
    }

    for _ in 0..3 {
        assert_eq!(common::recv_json(&mut ws).await["type"], "PONG");
    }
    let nack = common::recv_json(&mut ws).await;
    assert_eq!(nack["type"], "NACK");
    assert!(nack["id"].is_null());
    assert_eq!(nack["payload"]["code"], "RATE_LIMITED");

    // the connection survives rate limiting
    assert_eq!(server.connection_count(), 1);
    server.close().await;
}

#[tokio::test]
async fn test_broadcast_respects_exclusion() {
    let (server, addr) = common::start_server(common::test_config()).await;
    let mut events = server.subscribe();

    let mut clients = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        clients.push(common::connect(&server, addr).await);
        loop {
            if let ServerEvent::ClientConnected { id } = events.recv().await.unwrap() {
                ids.push(id);
                break;
            }
        }
    }

    let mut state = serde_json::Map::new();
    state.insert("version".into(), json!(7));
    let outcome = server.broadcast(&state_sync::Envelope::state_update(state), Some(ids[0]));
    assert_eq!(outcome.sent, 2);
    assert_eq!(outcome.failed, 0);

    for ws in clients.iter_mut().skip(1) {
        let frame = common::recv_json(ws).await;
        assert_eq!(frame["type"], "STATE_UPDATE");
        assert_eq!(frame["payload"]["version"], 7);
    }
    common::assert_silent(&mut clients[0], Duration::from_millis(100)).await;

    server.close().await;
}

#[tokio::test]
async fn test_send_to_unknown_connection_is_false() {
    let (server, _addr) = common::start_server(common::test_config()).await;
    let envelope = state_sync::Envelope::ack("x");
    assert!(!server.send(state_sync::ConnectionId::new(), &envelope));
    server.close().await;
}
