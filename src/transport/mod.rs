//! Transport subsystem: sockets, registry and dispatch.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind with bounded retry)
//!     → router.rs (axum routes, upgrade on the configured path)
//!     → websocket.rs (per-connection task owns the socket)
//!     → server.rs
//!         on_connect: guard admission → registry.rs insert → ClientConnected
//!         on_message: guard rate check → size check → protocol validation
//!                     → Message event (PING answered with PONG)
//!         on_close:   registry remove → guard release → ClientDisconnected
//!     → events.rs (typed fan-out to collaborators)
//!
//! Connection States:
//!     Open → Closing → (removed from registry)
//! ```
//!
//! # Design Decisions
//! - This is the only subsystem that touches sockets
//! - Collaborators get events, `send` and `broadcast`; never sockets
//! - Closing is idempotent: socket close, client error and heartbeat
//!   eviction may race on the same connection

pub mod connection;
pub mod events;
pub mod listener;
pub mod registry;
pub mod router;
pub mod server;
pub mod websocket;

pub use connection::{ConnectionId, ConnectionInfo};
pub use events::{ErrorPhase, ServerEvent};
pub use server::{replace, BroadcastOutcome, ServerError, ServerState, SyncServer};
