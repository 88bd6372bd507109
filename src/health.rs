//! Link health tracking and reconnect backoff.
//!
//! One [`LinkHealth`] per external link (sensor, actuator), updated by the
//! engine after every I/O attempt and read by the decision machine's
//! fail-safe logic. [`Backoff`] is the shared reconnect policy: exponential
//! from 2 s, capped at 60 s, reset on success.

use std::time::{Duration, Instant};

/// Health record for one external link.
#[derive(Debug, Clone, Copy)]
pub struct LinkHealth {
    connected: bool,
    last_success_at: Option<Instant>,
    consecutive_failures: u32,
}

impl LinkHealth {
    /// Links start disconnected; nothing is healthy until proven so.
    pub fn new() -> Self {
        Self {
            connected: false,
            last_success_at: None,
            consecutive_failures: 0,
        }
    }

    /// Record a successful I/O interaction at `now`.
    pub fn record_success(&mut self, now: Instant) {
        self.connected = true;
        self.last_success_at = Some(now);
        self.consecutive_failures = 0;
    }

    /// Record a failed I/O attempt. The link stays formally connected until
    /// [`mark_disconnected`](Self::mark_disconnected); a single flaky call
    /// is a failure count, not a disconnect.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// The link is down (transport-level disconnect or give-up).
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_success_at(&self) -> Option<Instant> {
        self.last_success_at
    }

    /// Healthy means connected, no failure streak, and (when `liveness` is
    /// given) a success recent enough to prove the link is actually alive.
    /// A link that connected but never succeeded is not healthy.
    pub fn is_healthy(&self, now: Instant, liveness: Option<Duration>) -> bool {
        if !self.connected || self.consecutive_failures > 0 {
            return false;
        }
        match (liveness, self.last_success_at) {
            (None, Some(_)) => true,
            (Some(window), Some(at)) => now.saturating_duration_since(at) <= window,
            (_, None) => false,
        }
    }
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Bounded exponential backoff for reconnect attempts.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    current: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            current: INITIAL_BACKOFF,
        }
    }

    /// Delay to wait before the next attempt; doubles up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(MAX_BACKOFF);
        delay
    }

    /// Call after a successful (re)connect.
    pub fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_link_is_unhealthy() {
        let h = LinkHealth::new();
        assert!(!h.is_healthy(Instant::now(), None));
    }

    #[test]
    fn success_makes_healthy_failure_streak_breaks_it() {
        let now = Instant::now();
        let mut h = LinkHealth::new();
        h.record_success(now);
        assert!(h.is_healthy(now, None));

        h.record_failure();
        assert!(!h.is_healthy(now, None));
        assert_eq!(h.consecutive_failures(), 1);

        h.record_success(now);
        assert!(h.is_healthy(now, None));
        assert_eq!(h.consecutive_failures(), 0);
    }

    #[test]
    fn staleness_counts_as_unhealthy() {
        let t0 = Instant::now();
        let mut h = LinkHealth::new();
        h.record_success(t0);

        let liveness = Some(Duration::from_secs(10));
        assert!(h.is_healthy(t0 + Duration::from_secs(10), liveness));
        assert!(
            !h.is_healthy(t0 + Duration::from_secs(11), liveness),
            "a silent link past the liveness window is dead even while connected"
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut b = Backoff::new();
        assert_eq!(b.next_delay(), Duration::from_secs(2));
        assert_eq!(b.next_delay(), Duration::from_secs(4));
        assert_eq!(b.next_delay(), Duration::from_secs(8));
        for _ in 0..10 {
            let _ = b.next_delay();
        }
        assert_eq!(b.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn backoff_resets_on_success() {
        let mut b = Backoff::new();
        let _ = b.next_delay();
        let _ = b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(2));
    }
}
