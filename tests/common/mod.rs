//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use state_sync::{SyncConfig, SyncServer};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Defaults tuned for tests: ephemeral port, fast heartbeat, no exporter.
pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.heartbeat.interval_ms = 60_000;
    config.heartbeat.timeout_ms = 120_000;
    config.bind_retry.delay_ms = 10;
    config.bind_retry.max_attempts = 3;
    config.observability.metrics_enabled = false;
    config
}

/// Start a server and return it with its bound address.
pub async fn start_server(config: SyncConfig) -> (SyncServer, SocketAddr) {
    let server = SyncServer::new(config);
    let addr = server.start().await.expect("server should start");
    (server, addr)
}

pub fn ws_url(server: &SyncServer, addr: SocketAddr) -> String {
    format!("ws://{}{}", addr, server.config().listener.path)
}

/// Open a client and wait until the server has registered it.
pub async fn connect(server: &SyncServer, addr: SocketAddr) -> Client {
    let before = server.connection_count();
    let (ws, _) = connect_async(ws_url(server, addr))
        .await
        .expect("websocket handshake");
    wait_until(|| server.connection_count() > before).await;
    ws
}

pub async fn send_text(ws: &mut Client, text: impl Into<String>) {
    ws.send(Message::text(text.into())).await.expect("send");
}

pub async fn send_json(ws: &mut Client, value: Value) {
    send_text(ws, value.to_string()).await;
}

/// Next text frame as JSON, skipping control frames.
pub async fn recv_json(ws: &mut Client) -> Value {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next())
            .await
            .expect("timed out waiting for a text frame")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("json frame"),
            Message::Close(frame) => panic!("unexpected close: {:?}", frame),
            _ => continue,
        }
    }
}

/// Read until the server closes; returns the close frame if one was sent.
pub async fn recv_close(ws: &mut Client) -> Option<CloseFrame> {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        match tokio::time::timeout_at(deadline, ws.next())
            .await
            .expect("timed out waiting for close")
        {
            Some(Ok(Message::Close(frame))) => return frame,
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

/// Assert that no text frame arrives within `window`.
pub async fn assert_silent(ws: &mut Client, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected frame: {}", text.as_str()),
            Ok(Some(Ok(_))) => continue,
            Ok(other) => panic!("connection ended: {:?}", other),
        }
    }
}

/// Poll `condition` every 10ms for up to two seconds.
pub async fn wait_until<F>(condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {:?}",
            RECV_TIMEOUT
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn envelope(id: &str, kind: &str, payload: Value) -> Value {
    serde_json::json!({
        "id": id,
        "type": kind,
        "timestamp": 1_700_000_000_000u64,
        "payload": payload,
    })
}
