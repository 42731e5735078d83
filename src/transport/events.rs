//! Typed event fan-out to external subscribers.
//!
//! Business logic observes the transport only through these events and acts
//! back through `SyncServer::send` / `SyncServer::broadcast`. Subscribers
//! never see sockets.

use std::fmt;
use std::net::SocketAddr;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::protocol::Envelope;
use crate::transport::connection::ConnectionId;

/// Where an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPhase {
    /// Acquiring the listening socket.
    Bind,
    /// Serving HTTP / accepting upgrades.
    Serve,
    /// A single client's socket failed.
    ClientError,
}

impl fmt::Display for ErrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorPhase::Bind => "bind",
            ErrorPhase::Serve => "serve",
            ErrorPhase::ClientError => "client_error",
        })
    }
}

/// Notifications published by the server.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Ready { addr: SocketAddr },
    ClientConnected { id: ConnectionId },
    ClientDisconnected { id: ConnectionId },
    Message { id: ConnectionId, envelope: Envelope },
    Error {
        connection_id: Option<ConnectionId>,
        error: String,
        phase: ErrorPhase,
    },
}

/// Broadcast channel wrapper. Publishing with no subscribers is not an error.
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(ServerEvent::ClientConnected { id: ConnectionId::new() });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let id = ConnectionId::new();

        bus.publish(ServerEvent::ClientDisconnected { id });

        for rx in [&mut a, &mut b] {
            match rx.recv().await.unwrap() {
                ServerEvent::ClientDisconnected { id: got } => assert_eq!(got, id),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn client_error_phase_name() {
        assert_eq!(ErrorPhase::ClientError.to_string(), "client_error");
        assert_eq!(
            serde_json::to_string(&ErrorPhase::ClientError).unwrap(),
            "\"client_error\""
        );
    }
}
