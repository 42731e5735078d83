//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Init metrics → SyncServer::new → start (bind with retry, heartbeat)
//!
//! Shutdown (shutdown.rs):
//!     close() → close sockets → trigger → HTTP server drains → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listener starts last within `start` (traffic only when ready)
//! - Ordered shutdown: stop heartbeat, close sockets, release listener
//! - Draining the HTTP server has a deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
