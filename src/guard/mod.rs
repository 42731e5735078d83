//! Connection guard: admission control and liveness policy.
//!
//! # Data Flow
//! ```text
//! New socket:
//!     → next_connection_id()
//!     → admission.rs (per-source cap, keyed by IP)
//!     → admitted / refused with policy close
//!
//! Inbound frame:
//!     → rate_limit.rs (sliding window, keyed by connection id)
//!     → allowed / RATE_LIMITED
//!
//! Timer:
//!     heartbeat.rs sweep → ping live connections, evict silent ones
//! ```
//!
//! # Design Decisions
//! - Admission and throughput are separate policies on separate keys: one
//!   source may hold several connections, each rate limited on its own
//! - Holds no socket references; the transport registry is reached only
//!   through the `LivenessRegistry` trait
//! - Both bookkeeping maps drop entries as connections close, so they are
//!   empty whenever the server holds no connections

pub mod admission;
pub mod connection_id;
pub mod heartbeat;
pub mod rate_limit;

use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;

pub use admission::{AdmissionControl, AdmissionError};
pub use connection_id::ConnectionId;
pub use heartbeat::{Heartbeat, LivenessRegistry, Probe, SweepReport};
pub use rate_limit::SlidingWindowLimiter;

use crate::config::{HeartbeatConfig, LimitsConfig};

/// Snapshot of guard bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuardStats {
    pub tracked_sources: usize,
    pub rate_windows: usize,
    pub heartbeat_running: bool,
}

/// Admission, rate and liveness policy for one server instance.
pub struct ConnectionGuard {
    admission: AdmissionControl,
    rate_limiter: SlidingWindowLimiter,
    heartbeat: Heartbeat,
}

impl ConnectionGuard {
    pub fn new(limits: &LimitsConfig, heartbeat: &HeartbeatConfig) -> Self {
        Self {
            admission: AdmissionControl::new(limits.max_connections_per_source),
            rate_limiter: SlidingWindowLimiter::new(limits.max_messages_per_window, limits.window()),
            heartbeat: Heartbeat::new(heartbeat.interval(), heartbeat.timeout()),
        }
    }

    /// Mint the id for a freshly accepted socket.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new()
    }

    /// Whether `source` is below its connection cap. Does not mutate state.
    pub fn check_connection_limit(&self, source: IpAddr) -> bool {
        self.admission.check(source)
    }

    pub fn track_connection(&self, source: IpAddr) {
        self.admission.track(source);
    }

    pub fn untrack_connection(&self, source: IpAddr) {
        self.admission.untrack(source);
    }

    /// Check and track atomically, so concurrent connects from one source
    /// cannot overshoot the cap.
    pub fn try_admit(&self, source: IpAddr) -> Result<(), AdmissionError> {
        if self.admission.try_admit(source) {
            Ok(())
        } else {
            Err(AdmissionError::SourceLimit {
                addr: source,
                limit: self.admission.max_per_source(),
            })
        }
    }

    /// Open the rate window for an admitted connection. Must happen before
    /// the connection becomes visible to other tasks.
    pub fn open_rate_limit(&self, id: ConnectionId) {
        self.rate_limiter.open(id);
    }

    /// Record an inbound message; false once the connection is over its cap
    /// or its window has been cleared.
    pub fn check_rate_limit(&self, id: ConnectionId) -> bool {
        self.rate_limiter.check(id)
    }

    pub fn clear_rate_limit(&self, id: ConnectionId) {
        self.rate_limiter.clear(id);
    }

    /// Start the liveness sweep over `registry`.
    pub fn start_heartbeat<R, F>(&self, registry: Arc<R>, on_timeout: F)
    where
        R: LivenessRegistry,
        F: Fn(ConnectionId) + Send + Sync + 'static,
    {
        self.heartbeat.start(registry, on_timeout);
    }

    /// Stop the heartbeat timer. Idempotent.
    pub fn stop(&self) {
        self.heartbeat.stop();
    }

    /// Drop all bookkeeping.
    pub fn reset(&self) {
        self.admission.clear();
        self.rate_limiter.reset();
    }

    pub fn source_connections(&self, source: IpAddr) -> usize {
        self.admission.count(source)
    }

    /// Sources with at least one open connection.
    pub fn tracked_sources(&self) -> usize {
        self.admission.tracked_sources()
    }

    /// Connections with a live sliding window.
    pub fn rate_windows(&self) -> usize {
        self.rate_limiter.active_windows()
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats {
            tracked_sources: self.tracked_sources(),
            rate_windows: self.rate_windows(),
            heartbeat_running: self.heartbeat.is_running(),
        }
    }
}
