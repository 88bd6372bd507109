//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to the
//! logger. A future metrics or push adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_decision={}", state.as_str());
            }
            AppEvent::DecisionChanged {
                from,
                to,
                smoothed_rpm,
                threshold_rpm,
            } => {
                info!(
                    "DECISION | {} -> {} | avg={:.1} RPM | threshold={:.1} RPM",
                    from.as_str(),
                    to.as_str(),
                    smoothed_rpm,
                    threshold_rpm,
                );
            }
            AppEvent::SensorHealthChanged { healthy } => {
                if *healthy {
                    info!("HEALTH | sensor=up");
                } else {
                    warn!("HEALTH | sensor=down");
                }
            }
            AppEvent::ActuatorHealthChanged { healthy } => {
                if *healthy {
                    info!("HEALTH | actuator=up");
                } else {
                    warn!("HEALTH | actuator=down");
                }
            }
            AppEvent::Status(s) => {
                info!(
                    "STATUS | cadence={:.0} RPM | avg={:.1} RPM | access={} | sensor={} actuator={}",
                    s.instantaneous_rpm,
                    s.averaged_rpm,
                    s.decision.as_str(),
                    if s.sensor_healthy { "OK" } else { "DOWN" },
                    if s.actuator_healthy { "OK" } else { "DOWN" },
                );
            }
        }
    }
}
