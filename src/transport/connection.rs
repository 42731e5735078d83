//! Per-connection state and lifecycle tracking.
//!
//! # Responsibilities
//! - Hold the outbound queue feeding the connection's socket task
//! - Track liveness (alive flag, last liveness signal)
//! - Count accepted messages
//!
//! The socket itself lives in the per-connection task (`websocket.rs`);
//! everything else reaches it only by queueing `Outbound` frames here.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;

pub use crate::guard::ConnectionId;
use crate::guard::Probe;
use crate::protocol::message::now_millis;

/// A frame queued for the socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// JSON text frame.
    Text(String),
    /// WebSocket ping frame (heartbeat probe).
    Ping,
    /// Send a close frame, then end the connection.
    Close { code: u16, reason: &'static str },
    /// Drop the socket without a close handshake.
    Terminate,
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connection is registered and accepting frames.
    Open,
    /// Close or terminate has been queued.
    Closing,
}

/// A registered client connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    source: IpAddr,
    /// Wall-clock connect time, ms since the Unix epoch.
    connected_at: u64,
    opened: Instant,
    /// ms after `opened` of the last liveness signal.
    last_seen_ms: AtomicU64,
    alive: AtomicBool,
    open: AtomicBool,
    message_count: AtomicU64,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    pub fn new(id: ConnectionId, source: IpAddr, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            source,
            connected_at: now_millis(),
            opened: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
            alive: AtomicBool::new(true),
            open: AtomicBool::new(true),
            message_count: AtomicU64::new(0),
            outbound,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn source(&self) -> IpAddr {
        self.source
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    /// Count an accepted (validated) message.
    pub fn record_message(&self) -> u64 {
        self.message_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Record a liveness signal.
    pub fn mark_alive(&self) {
        let elapsed = self.opened.elapsed().as_millis() as u64;
        self.last_seen_ms.store(elapsed, Ordering::Relaxed);
        self.alive.store(true, Ordering::Relaxed);
    }

    /// Clear the alive flag, returning what it replaced.
    pub fn begin_probe(&self) -> Probe {
        let was_alive = self.alive.swap(false, Ordering::Relaxed);
        let last_seen = Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed));
        Probe {
            was_alive,
            since_last_seen: self.opened.elapsed().saturating_sub(last_seen),
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.open.load(Ordering::Acquire) {
            ConnectionState::Open
        } else {
            ConnectionState::Closing
        }
    }

    /// Queue a frame. Returns false if the connection is closing or its
    /// socket task has gone away.
    pub fn send(&self, frame: Outbound) -> bool {
        if self.state() != ConnectionState::Open {
            return false;
        }
        self.outbound.send(frame).is_ok()
    }

    /// Queue a close frame; later sends fail.
    pub fn close(&self, code: u16, reason: &'static str) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.outbound.send(Outbound::Close { code, reason });
        }
    }

    /// Drop the socket without a close handshake; later sends fail.
    pub fn terminate(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.outbound.send(Outbound::Terminate);
        }
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            source: self.source,
            connected_at: self.connected_at,
            message_count: self.message_count(),
            alive: self.is_alive(),
            state: self.state(),
        }
    }
}

/// Read-only view of a connection for collaborators and the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub source: IpAddr,
    pub connected_at: u64,
    pub message_count: u64,
    pub alive: bool,
    pub state: ConnectionState,
}
