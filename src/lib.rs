//! Real-time state synchronization over WebSocket.

pub mod admin;
pub mod config;
pub mod guard;
pub mod lifecycle;
pub mod observability;
pub mod protocol;
pub mod transport;

pub use config::schema::SyncConfig;
pub use guard::ConnectionGuard;
pub use lifecycle::Shutdown;
pub use protocol::{Envelope, ErrorCode, Message, MessageType};
pub use transport::{ConnectionId, ServerEvent, ServerState, SyncServer};
