//! Heartbeat liveness sweeps.
//!
//! # Responsibilities
//! - Periodically probe every registered connection
//! - Evict connections that did not answer the previous probe
//!
//! # Design Decisions
//! - The sweep never touches sockets; pings and the alive flag go through
//!   the `LivenessRegistry` owned by the transport layer
//! - A missed probe is only acted on at the next sweep, so a connection
//!   gets one full interval to answer

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::guard::ConnectionId;

/// Liveness state of a connection captured at the start of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Alive flag before the sweep cleared it.
    pub was_alive: bool,
    /// Time since the last liveness signal (pong or heartbeat envelope).
    pub since_last_seen: Duration,
}

/// What the heartbeat needs from the connection registry.
pub trait LivenessRegistry: Send + Sync + 'static {
    /// Ids of every registered connection.
    fn connection_ids(&self) -> Vec<ConnectionId>;

    /// Clear the alive flag and return the state it replaced.
    /// `None` if the connection is no longer registered.
    fn begin_probe(&self, id: ConnectionId) -> Option<Probe>;

    /// Ask the connection's socket to send a ping. Returns false if the
    /// ping could not be queued.
    fn ping(&self, id: ConnectionId) -> bool;
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pinged: usize,
    pub evicted: usize,
}

/// Run one liveness sweep over `registry`.
pub fn sweep<R>(registry: &R, timeout: Duration, on_timeout: &dyn Fn(ConnectionId)) -> SweepReport
where
    R: LivenessRegistry + ?Sized,
{
    let mut report = SweepReport::default();

    for id in registry.connection_ids() {
        let Some(probe) = registry.begin_probe(id) else {
            continue;
        };

        if !probe.was_alive || probe.since_last_seen > timeout {
            tracing::warn!(
                connection_id = %id,
                since_last_seen_ms = probe.since_last_seen.as_millis() as u64,
                "Heartbeat timeout, evicting connection"
            );
            on_timeout(id);
            report.evicted += 1;
            continue;
        }

        if registry.ping(id) {
            report.pinged += 1;
        }
    }

    report
}

/// Floor for the sweep period; `tokio::time::interval` panics on zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Owns the periodic sweep task.
pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Heartbeat {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        if interval < MIN_INTERVAL {
            tracing::warn!(
                interval_ms = interval.as_millis() as u64,
                "Heartbeat interval below 1ms, clamping"
            );
        }
        Self {
            interval: interval.max(MIN_INTERVAL),
            timeout,
            task: Mutex::new(None),
        }
    }

    /// Start sweeping `registry` every interval. The first sweep runs one
    /// interval after start. Calling this while already running restarts
    /// the timer.
    pub fn start<R, F>(&self, registry: Arc<R>, on_timeout: F)
    where
        R: LivenessRegistry,
        F: Fn(ConnectionId) + Send + Sync + 'static,
    {
        let interval = self.interval;
        let timeout = self.timeout;

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let report = sweep(registry.as_ref(), timeout, &on_timeout);
                tracing::trace!(
                    pinged = report.pinged,
                    evicted = report.evicted,
                    "Heartbeat sweep complete"
                );
            }
        });

        let previous = self
            .task
            .lock()
            .expect("heartbeat mutex poisoned")
            .replace(handle);
        if let Some(previous) = previous {
            tracing::warn!("Heartbeat restarted while running");
            previous.abort();
        }

        tracing::debug!(
            interval_ms = interval.as_millis() as u64,
            timeout_ms = timeout.as_millis() as u64,
            "Heartbeat started"
        );
    }

    /// Cancel the sweep timer. Safe to call repeatedly.
    pub fn stop(&self) {
        let task = self.task.lock().expect("heartbeat mutex poisoned").take();
        if let Some(task) = task {
            task.abort();
            tracing::debug!("Heartbeat stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .expect("heartbeat mutex poisoned")
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}
