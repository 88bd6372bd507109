//! Access decision state machine.
//!
//! Two committed states, `Allow` and `Block`, plus an internal pending
//! transition that implements grace-period hysteresis:
//!
//! ```text
//!  BLOCK ──[avg >= threshold for grace]──▶ ALLOW
//!    ▲                                       │
//!    └──[avg < threshold, or sensor lost,────┘
//!        sustained for grace]
//! ```
//!
//! A target that keeps flipping never accumulates grace time: each reversal
//! restarts the pending timer, so a slow oscillation cannot sneak a commit
//! through. A disconnected sensor always drives the target to `Block`; the
//! machine never trusts the last known cadence when effort cannot be
//! verified.

use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// The committed access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessState {
    Allow,
    Block,
}

impl AccessState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Block => "BLOCK",
        }
    }
}

/// A committed decision change, emitted exactly once per commit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessEdge {
    pub from: AccessState,
    pub to: AccessState,
    /// Smoothed cadence at commit time, for the log line.
    pub smoothed_rpm: f32,
}

#[derive(Debug, Clone, Copy)]
struct PendingTransition {
    target: AccessState,
    since: Instant,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// The access decision machine. Owns its state exclusively; mutation only
/// happens through [`tick`](Self::tick).
#[derive(Debug)]
pub struct AccessController {
    current: AccessState,
    pending: Option<PendingTransition>,
    threshold_rpm: f32,
    grace_period: Duration,
}

impl AccessController {
    /// Starts in `Block`: access stays blocked until sufficient cadence has
    /// been positively observed.
    pub fn new(threshold_rpm: f32, grace_period: Duration) -> Self {
        Self {
            current: AccessState::Block,
            pending: None,
            threshold_rpm,
            grace_period,
        }
    }

    pub fn current(&self) -> AccessState {
        self.current
    }

    /// The target currently accumulating grace time, if any.
    pub fn pending_target(&self) -> Option<AccessState> {
        self.pending.map(|p| p.target)
    }

    /// Run one evaluation. Returns a decision edge when (and only when) a
    /// pending target survives the full grace period and commits.
    ///
    /// Actuator health is deliberately not an input: the decision keeps
    /// updating while the actuator is down so the correct state is applied
    /// the moment the link recovers.
    pub fn tick(
        &mut self,
        smoothed_rpm: f32,
        sensor_healthy: bool,
        now: Instant,
    ) -> Option<AccessEdge> {
        let desired = if !sensor_healthy {
            // Cannot verify effort: default to blocked.
            AccessState::Block
        } else if smoothed_rpm >= self.threshold_rpm {
            AccessState::Allow
        } else {
            AccessState::Block
        };

        if desired == self.current {
            // Cadence recovered before the grace period elapsed: noise,
            // not a real state change.
            if self.pending.take().is_some() {
                debug!(
                    "decision: pending {} cancelled (avg {:.1} RPM)",
                    desired.as_str(),
                    smoothed_rpm
                );
            }
            return None;
        }

        match self.pending {
            Some(p) if p.target == desired => {
                if now.saturating_duration_since(p.since) >= self.grace_period {
                    let edge = AccessEdge {
                        from: self.current,
                        to: desired,
                        smoothed_rpm,
                    };
                    self.current = desired;
                    self.pending = None;
                    info!(
                        "decision: {} -> {} (avg {:.1} RPM, threshold {:.1} RPM)",
                        edge.from.as_str(),
                        edge.to.as_str(),
                        smoothed_rpm,
                        self.threshold_rpm
                    );
                    return Some(edge);
                }
                None
            }
            _ => {
                // New or reversed target: (re)start the grace timer.
                self.pending = Some(PendingTransition {
                    target: desired,
                    since: now,
                });
                debug!(
                    "decision: pending {} (avg {:.1} RPM, grace {:?})",
                    desired.as_str(),
                    smoothed_rpm,
                    self.grace_period
                );
                None
            }
        }
    }
}
