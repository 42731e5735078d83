//! Sliding-window message rate limiting per connection.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::guard::ConnectionId;

/// Per-connection sliding windows of message arrival times.
pub struct SlidingWindowLimiter {
    windows: Mutex<HashMap<ConnectionId, VecDeque<Instant>>>,
    max_messages: usize,
    window: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(max_messages: usize, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_messages,
            window,
        }
    }

    /// Start an empty window for a newly admitted connection.
    pub fn open(&self, id: ConnectionId) {
        self.windows
            .lock()
            .expect("rate limiter mutex poisoned")
            .entry(id)
            .or_default();
    }

    /// Record a message now and report whether it is within the cap.
    pub fn check(&self, id: ConnectionId) -> bool {
        self.check_at(id, Instant::now())
    }

    /// Record a message at `now` and report whether it is within the cap.
    ///
    /// The arrival is recorded even when rejected, so a client that keeps
    /// flooding stays limited until it slows down. Ids without an open
    /// window (never opened, or already cleared) are refused and leave no
    /// state behind.
    pub fn check_at(&self, id: ConnectionId, now: Instant) -> bool {
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let Some(window) = windows.get_mut(&id) else {
            return false;
        };

        window.push_back(now);
        while let Some(oldest) = window.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        window.len() <= self.max_messages
    }

    /// Drop the window for a closed connection.
    pub fn clear(&self, id: ConnectionId) {
        self.windows
            .lock()
            .expect("rate limiter mutex poisoned")
            .remove(&id);
    }

    /// Number of connections with a live window.
    pub fn active_windows(&self) -> usize {
        self.windows.lock().expect("rate limiter mutex poisoned").len()
    }

    pub fn reset(&self) {
        self.windows.lock().expect("rate limiter mutex poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_cap_then_rejects() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(1));
        let id = ConnectionId::new();
        limiter.open(id);
        let t0 = Instant::now();

        assert!(limiter.check_at(id, t0));
        assert!(limiter.check_at(id, t0));
        assert!(limiter.check_at(id, t0));
        assert!(!limiter.check_at(id, t0));
        assert!(!limiter.check_at(id, t0 + Duration::from_millis(10)));
    }

    #[test]
    fn window_slides() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_millis(100));
        let id = ConnectionId::new();
        limiter.open(id);
        let t0 = Instant::now();

        assert!(limiter.check_at(id, t0));
        assert!(limiter.check_at(id, t0 + Duration::from_millis(50)));
        assert!(!limiter.check_at(id, t0 + Duration::from_millis(60)));
        // t0 and t0+50 have aged out; only t0+60 remains
        assert!(limiter.check_at(id, t0 + Duration::from_millis(155)));
    }

    #[test]
    fn connections_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(1));
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        limiter.open(a);
        limiter.open(b);
        let now = Instant::now();

        assert!(limiter.check_at(a, now));
        assert!(!limiter.check_at(a, now));
        assert!(limiter.check_at(b, now));
    }

    #[test]
    fn clear_drops_state() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(1));
        let id = ConnectionId::new();
        limiter.open(id);
        let now = Instant::now();

        assert!(limiter.check_at(id, now));
        assert_eq!(limiter.active_windows(), 1);
        limiter.clear(id);
        assert_eq!(limiter.active_windows(), 0);
    }

    #[test]
    fn check_after_clear_does_not_recreate_window() {
        let limiter = SlidingWindowLimiter::new(5, Duration::from_secs(1));
        let id = ConnectionId::new();
        limiter.open(id);
        limiter.clear(id);

        assert!(!limiter.check(id));
        assert_eq!(limiter.active_windows(), 0);
    }

    #[test]
    fn unknown_connection_is_refused() {
        let limiter = SlidingWindowLimiter::new(5, Duration::from_secs(1));
        assert!(!limiter.check(ConnectionId::new()));
        assert_eq!(limiter.active_windows(), 0);
    }
}
