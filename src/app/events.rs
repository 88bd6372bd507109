//! Outbound application events and the status snapshot.
//!
//! The [`EngineService`](super::service::EngineService) emits these through
//! the [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them; the stock adapter writes log lines.

use serde::Serialize;

use crate::control::AccessState;

/// Structured events emitted by the engine core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The engine has started (carries the initial decision).
    Started(AccessState),

    /// A decision change survived the grace period and committed.
    DecisionChanged {
        from: AccessState,
        to: AccessState,
        smoothed_rpm: f32,
        threshold_rpm: f32,
    },

    /// Sensor link health flipped (connection state or liveness).
    SensorHealthChanged { healthy: bool },

    /// Actuator link health flipped.
    ActuatorHealthChanged { healthy: bool },

    /// Periodic status snapshot.
    Status(StatusSnapshot),
}

/// Read-only snapshot for the dashboard collaborator, refreshed at least
/// once per evaluation tick.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusSnapshot {
    /// Most recent instantaneous cadence (0 when the sensor is down).
    pub instantaneous_rpm: f32,
    /// Rolling-window average used by the decision machine this tick.
    pub averaged_rpm: f32,
    /// The committed access decision.
    pub decision: AccessState,
    pub sensor_healthy: bool,
    pub actuator_healthy: bool,
    /// Wall-clock time of the tick that produced this snapshot
    /// (milliseconds since the Unix epoch).
    pub last_update_unix_ms: u64,
}

impl StatusSnapshot {
    /// Fail-safe snapshot used before the first tick completes.
    pub fn initial() -> Self {
        Self {
            instantaneous_rpm: 0.0,
            averaged_rpm: 0.0,
            decision: AccessState::Block,
            sensor_healthy: false,
            actuator_healthy: false,
            last_update_unix_ms: 0,
        }
    }
}
