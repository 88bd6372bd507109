//! Port traits: the hexagonal boundary between the engine and the world.
//!
//! ```text
//!   SensorLink ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!                  │      EngineService        │
//!  ActuatorLink ◀──│  Window · Decision · Health│
//!                  └──────────────────────────┘
//! ```
//!
//! Driven adapters (BLE transport, UniFi client, log sink) implement these
//! traits. The engine consumes them via generics, so the domain core never
//! touches a socket directly.

use std::time::Duration;

use crate::control::AccessState;
use crate::error::LinkError;

// ───────────────────────────────────────────────────────────────
// Sensor link (driven adapter: sensor → domain)
// ───────────────────────────────────────────────────────────────

/// The cadence sensor link. The engine is handed a target identifier;
/// discovery/pairing UX is a one-time bootstrap step outside this trait.
pub trait SensorLink {
    /// Establish the link to the configured sensor and subscribe to
    /// measurement notifications.
    fn connect(&mut self) -> Result<(), LinkError>;

    /// Wait up to `timeout` for the next raw notification payload.
    ///
    /// `Ok(None)` means the timeout elapsed with the link still up.
    /// `Err(LinkError::SensorLost)` means the link dropped; the caller owns
    /// reconnection.
    fn recv_notification(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, LinkError>;

    /// Cheap liveness check of the underlying transport.
    fn is_connected(&self) -> bool;

    /// Tear the link down. Safe to call when already disconnected.
    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Actuator link (domain → access controller)
// ───────────────────────────────────────────────────────────────

/// The access-control toggle. `set_access` must be idempotent: applying the
/// already-active state is a no-op or safely repeatable. Authentication and
/// session handling are entirely the adapter's concern; every failure
/// surfaces uniformly as a [`LinkError`].
pub trait ActuatorLink {
    /// Verify reachability and resolve the backing rule. Returns the access
    /// state currently enforced by the backend when it reports one.
    fn verify(&mut self) -> Result<Option<AccessState>, LinkError>;

    /// Drive the backend to `state`.
    fn set_access(&mut self, state: AccessState) -> Result<(), LinkError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The engine emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go (log lines, a future
/// metrics push, the dashboard process).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
