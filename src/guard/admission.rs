//! Per-source admission control.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use thiserror::Error;

use crate::protocol::close_code;

/// Why a new connection was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("connection limit of {limit} reached for {addr}")]
    SourceLimit { addr: IpAddr, limit: usize },

    #[error("server is shutting down")]
    ShuttingDown,
}

impl AdmissionError {
    /// WebSocket close code sent to the refused client.
    pub fn close_code(&self) -> u16 {
        match self {
            AdmissionError::SourceLimit { .. } => close_code::POLICY_VIOLATION,
            AdmissionError::ShuttingDown => close_code::GOING_AWAY,
        }
    }
}

/// Tracks open connections per source address.
///
/// Entries are removed when their count drops to zero, so the map is empty
/// whenever no connections are open.
pub struct AdmissionControl {
    /// open connections per source: addr -> count
    counts: Mutex<HashMap<IpAddr, usize>>,
    max_per_source: usize,
}

impl AdmissionControl {
    pub fn new(max_per_source: usize) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            max_per_source,
        }
    }

    /// Returns true if `source` may open another connection. Read-only.
    pub fn check(&self, source: IpAddr) -> bool {
        self.count(source) < self.max_per_source
    }

    /// Record a new connection from `source`.
    pub fn track(&self, source: IpAddr) {
        let mut counts = self.counts.lock().expect("admission mutex poisoned");
        *counts.entry(source).or_insert(0) += 1;
    }

    /// Release a connection from `source`. Never goes below zero.
    pub fn untrack(&self, source: IpAddr) {
        let mut counts = self.counts.lock().expect("admission mutex poisoned");
        match counts.get_mut(&source) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                counts.remove(&source);
            }
            None => {
                tracing::warn!(source = %source, "Untrack for source with no open connections");
            }
        }
    }

    /// Check and track in one step.
    /// Returns true if allowed, false if limit reached.
    pub fn try_admit(&self, source: IpAddr) -> bool {
        let mut counts = self.counts.lock().expect("admission mutex poisoned");
        let current = counts.entry(source).or_insert(0);

        if *current < self.max_per_source {
            *current += 1;
            true
        } else {
            if *current == 0 {
                counts.remove(&source);
            }
            false
        }
    }

    pub fn count(&self, source: IpAddr) -> usize {
        let counts = self.counts.lock().expect("admission mutex poisoned");
        counts.get(&source).copied().unwrap_or(0)
    }

    /// Number of sources with at least one open connection.
    pub fn tracked_sources(&self) -> usize {
        self.counts.lock().expect("admission mutex poisoned").len()
    }

    pub fn max_per_source(&self) -> usize {
        self.max_per_source
    }

    pub fn clear(&self) {
        self.counts.lock().expect("admission mutex poisoned").clear();
    }
}
