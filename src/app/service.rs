//! Engine service: the hexagonal core.
//!
//! [`EngineService`] owns the rolling window, the decision machine, and
//! both link-health records. The engine loop feeds it decoded samples and
//! link events, then calls [`tick`](EngineService::tick) once per
//! evaluation interval; the service decides, and converges the actuator on
//! decision edges only.
//!
//! Actuator convergence is retry-with-coalescing: the service remembers the
//! latest committed decision that the actuator has not acknowledged and
//! re-attempts exactly that on every tick until it succeeds. Intermediate
//! decisions overwritten before the link recovers are dropped; the decision
//! already committed by the machine is authoritative and the actuator call
//! is merely catching up.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{info, warn};

use crate::config::EngineConfig;
use crate::control::{AccessController, AccessState, RollingWindow};
use crate::health::LinkHealth;
use crate::sensors::CadenceSample;

use super::events::{AppEvent, StatusSnapshot};
use super::ports::{ActuatorLink, EventSink};

/// The engine core. One instance per process; state lives for the process
/// lifetime and always restarts from fail-safe `Block`.
pub struct EngineService {
    window: RollingWindow,
    controller: AccessController,
    sensor_health: LinkHealth,
    actuator_health: LinkHealth,
    liveness_timeout: Duration,
    threshold_rpm: f32,
    instantaneous_rpm: f32,
    /// Latest committed decision the actuator has not acknowledged yet.
    unapplied: Option<AccessState>,
    /// Last state the actuator acknowledged.
    applied: Option<AccessState>,
    reported_sensor_healthy: bool,
    reported_actuator_healthy: bool,
    tick_count: u64,
}

impl EngineService {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            window: RollingWindow::new(config.window_duration()),
            controller: AccessController::new(config.threshold_rpm, config.grace_period()),
            sensor_health: LinkHealth::new(),
            actuator_health: LinkHealth::new(),
            liveness_timeout: config.sensor_liveness_timeout(),
            threshold_rpm: config.threshold_rpm,
            instantaneous_rpm: 0.0,
            // Enforce the fail-safe on the very first tick instead of
            // trusting whatever state the backend happens to be in.
            unapplied: Some(AccessState::Block),
            applied: None,
            reported_sensor_healthy: false,
            reported_actuator_healthy: false,
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Started(self.controller.current()));
        info!(
            "engine started, decision={} (fail-safe)",
            self.controller.current().as_str()
        );
    }

    // ── Sample and link ingestion (called by the pump side) ───

    /// Record one decoded cadence sample.
    pub fn ingest_sample(&mut self, sample: CadenceSample) {
        self.instantaneous_rpm = sample.rpm;
        self.window.record(sample);
        self.sensor_health.record_success(sample.observed_at);
    }

    /// The sensor link was freshly (re)established. Clears the window so
    /// stale pre-disconnect samples never blend with new readings.
    pub fn sensor_connected(&mut self, now: Instant) {
        self.window.reset();
        self.sensor_health.record_success(now);
    }

    /// The sensor link dropped.
    pub fn sensor_disconnected(&mut self) {
        self.sensor_health.mark_disconnected();
        self.instantaneous_rpm = 0.0;
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one evaluation cycle: liveness → average → decision → actuator
    /// convergence. Returns the refreshed status snapshot.
    pub fn tick(
        &mut self,
        now: Instant,
        actuator: &mut impl ActuatorLink,
        sink: &mut impl EventSink,
    ) -> StatusSnapshot {
        self.tick_count += 1;

        // 1. Sensor health, including the silent-sensor liveness cutoff: a
        //    link that stopped notifying counts as dead even while the
        //    transport still claims to be connected.
        let sensor_healthy = self
            .sensor_health
            .is_healthy(now, Some(self.liveness_timeout));
        if sensor_healthy != self.reported_sensor_healthy {
            self.reported_sensor_healthy = sensor_healthy;
            if sensor_healthy {
                info!("sensor link healthy");
            } else {
                warn!("sensor link unhealthy, failing safe toward BLOCK");
                self.instantaneous_rpm = 0.0;
            }
            sink.emit(&AppEvent::SensorHealthChanged {
                healthy: sensor_healthy,
            });
        }

        // 2. Smooth.
        let averaged_rpm = self.window.average(now);

        // 3. Decide.
        if let Some(edge) = self.controller.tick(averaged_rpm, sensor_healthy, now) {
            sink.emit(&AppEvent::DecisionChanged {
                from: edge.from,
                to: edge.to,
                smoothed_rpm: edge.smoothed_rpm,
                threshold_rpm: self.threshold_rpm,
            });
            // Latest decision wins; an older unapplied target is dropped.
            self.unapplied = Some(edge.to);
        }

        // 4. Converge the actuator on the outstanding decision, if any.
        self.apply_actuator(now, actuator);

        let actuator_healthy = self.actuator_health.is_healthy(now, None);
        if actuator_healthy != self.reported_actuator_healthy {
            self.reported_actuator_healthy = actuator_healthy;
            if actuator_healthy {
                info!("actuator link healthy");
            } else {
                warn!("actuator link unhealthy, will retry last decision");
            }
            sink.emit(&AppEvent::ActuatorHealthChanged {
                healthy: actuator_healthy,
            });
        }

        // 5. Refresh the snapshot.
        StatusSnapshot {
            instantaneous_rpm: self.instantaneous_rpm,
            averaged_rpm,
            decision: self.controller.current(),
            sensor_healthy,
            actuator_healthy,
            last_update_unix_ms: unix_millis(),
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn decision(&self) -> AccessState {
        self.controller.current()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Last state the actuator acknowledged, if any.
    pub fn applied_access(&self) -> Option<AccessState> {
        self.applied
    }

    // ── Internal ──────────────────────────────────────────────

    /// The dirty-target convergence step. Only ever called from `tick`, so
    /// actuator calls are serialized by construction: no second toggle is
    /// issued while one is outstanding.
    fn apply_actuator(&mut self, now: Instant, actuator: &mut impl ActuatorLink) {
        let Some(target) = self.unapplied else {
            return;
        };

        if self.applied == Some(target) {
            // Already enforced; nothing to repeat.
            self.unapplied = None;
            return;
        }

        match actuator.set_access(target) {
            Ok(()) => {
                self.applied = Some(target);
                self.unapplied = None;
                self.actuator_health.record_success(now);
                info!("actuator: access set to {}", target.as_str());
            }
            Err(e) => {
                self.actuator_health.record_failure();
                warn!(
                    "actuator: set_access({}) failed ({}), attempt {}",
                    target.as_str(),
                    e,
                    self.actuator_health.consecutive_failures()
                );
            }
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
