//! Wire protocol for the state-sync transport.
//!
//! # Data Flow
//! ```text
//! raw text frame
//!     → validation.rs (JSON parse, envelope shape, per-type payload schema)
//!     → message.rs (typed Envelope + Message)
//!     → transport layer (dispatch / reply)
//!
//! Replies built here:
//!     PING  → Envelope::pong (echoes the ping timestamp)
//!     error → Envelope::nack (correlation id + ErrorCode)
//! ```
//!
//! # Design Decisions
//! - Pure code: no I/O, no clocks other than stamping outbound envelopes
//! - Message kinds are a closed enum; adding one is a compile-time change
//! - Error codes are stable strings so clients can branch on them

pub mod codes;
pub mod message;
pub mod validation;

pub use codes::{close_code, ErrorCode};
pub use message::{Envelope, Message, MessageType, NackPayload};
pub use validation::{extract_id, validate, ValidationError};
