//! Time-bounded rolling average of cadence samples.
//!
//! The window is bounded by duration, not by count: CSC sensors notify per
//! crank event, so the notification rate rises and falls with cadence and a
//! fixed-count buffer would represent a variable time span. Entries are
//! purged lazily on each averaging query.
//!
//! The mean is unweighted by inter-sample spacing. That biases the average
//! toward densely-sampled periods; accepted approximation.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::sensors::CadenceSample;

/// Rolling window of recent cadence samples, ordered by `observed_at`.
#[derive(Debug)]
pub struct RollingWindow {
    samples: VecDeque<CadenceSample>,
    window: Duration,
}

impl RollingWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
        }
    }

    /// Append one sample. Samples arrive from a single producer in receive
    /// order, so the deque stays sorted by `observed_at` without effort.
    pub fn record(&mut self, sample: CadenceSample) {
        self.samples.push_back(sample);
    }

    /// Mean RPM of all samples still inside the window at `now`.
    ///
    /// An empty window yields `0.0`: no data reads as zero cadence, the
    /// fail-safe low value.
    pub fn average(&mut self, now: Instant) -> f32 {
        self.purge(now);
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.samples.iter().map(|s| s.rpm).sum();
        sum / self.samples.len() as f32
    }

    /// Drop everything. Called when the sensor link is freshly established
    /// so pre-disconnect samples never blend with post-reconnect readings.
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Number of samples currently buffered (pre-purge).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Remove entries older than the window. A sample exactly `window` old
    /// is still counted.
    fn purge(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if now.saturating_duration_since(front.observed_at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}
