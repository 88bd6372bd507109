//! Shared status snapshot for the dashboard collaborator.
//!
//! The engine publishes a fresh [`StatusSnapshot`] after every evaluation
//! tick; the dashboard process polls [`StatusHandle::snapshot`] (and
//! typically serves it as JSON). The handle is the only state shared with
//! the outside and is a plain mutex: one writer, occasional readers.

use std::sync::{Arc, Mutex};

use crate::app::events::StatusSnapshot;

/// Cloneable handle to the latest engine status.
#[derive(Clone)]
pub struct StatusHandle {
    inner: Arc<Mutex<StatusSnapshot>>,
}

impl StatusHandle {
    /// Starts with the fail-safe snapshot (blocked, both links unhealthy).
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatusSnapshot::initial())),
        }
    }

    /// Replace the published snapshot. Called by the engine each tick.
    pub fn publish(&self, snapshot: StatusSnapshot) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = snapshot;
        }
    }

    /// Read the latest snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner
            .lock()
            .map(|guard| *guard)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}
