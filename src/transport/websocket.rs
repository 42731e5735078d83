//! WebSocket upgrade and the per-connection socket task.
//!
//! # Data Flow
//! ```text
//! GET <path> (Upgrade: websocket)
//!     → ws_handler (resolve source address)
//!     → handle_socket
//!         → SyncServer::on_connect (refused → close frame, done)
//!         → loop { outbound queue → socket | socket → SyncServer::on_* }
//!         → SyncServer::on_close
//! ```
//!
//! # Design Decisions
//! - One task per connection owns the socket, so frames from a client are
//!   handled strictly in arrival order
//! - Everything else reaches the socket through the `Outbound` queue

use std::net::{IpAddr, SocketAddr};

use axum::{
    body::Bytes,
    extract::{
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::HeaderMap,
    response::Response,
};
use tokio::sync::mpsc;

use crate::transport::connection::Outbound;
use crate::transport::server::SyncServer;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Upgrade handler mounted at the configured path.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(server): State<SyncServer>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let source = resolve_source(peer, &headers, server.config().listener.trust_forwarded_for);
    ws.on_upgrade(move |socket| handle_socket(server, socket, source))
}

/// The admission key for a client: its IP, or the first `X-Forwarded-For`
/// hop when the deployment sits behind a trusted proxy.
pub fn resolve_source(peer: SocketAddr, headers: &HeaderMap, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    peer.ip()
}

async fn handle_socket(server: SyncServer, mut socket: WebSocket, source: IpAddr) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let id = match server.on_connect(source, tx) {
        Ok(id) => id,
        Err(refusal) => {
            let frame = CloseFrame {
                code: refusal.close_code(),
                reason: Utf8Bytes::from(refusal.to_string()),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = socket.send(Message::Text(Utf8Bytes::from(text))).await {
                        server.on_error(id, e);
                        break;
                    }
                }
                Some(Outbound::Ping) => {
                    if let Err(e) = socket.send(Message::Ping(Bytes::new())).await {
                        server.on_error(id, e);
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code,
                        reason: Utf8Bytes::from_static(reason),
                    };
                    let _ = socket.send(Message::Close(Some(frame))).await;
                    break;
                }
                Some(Outbound::Terminate) | None => break,
            },

            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => server.on_message(id, text.as_str()),
                Some(Ok(Message::Binary(_))) => server.on_binary(id),
                Some(Ok(Message::Pong(_))) => server.on_pong(id),
                // answered by the socket layer
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    server.on_error(id, e);
                    break;
                }
            },
        }
    }

    server.on_close(id);
}
