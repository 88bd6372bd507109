//! Signal conditioning and the access decision machine.
//!
//! [`window`] smooths decoded cadence samples over a time-bounded window;
//! [`decision`] turns the smoothed value plus link health into the
//! Allow/Block decision with grace-period hysteresis.

pub mod decision;
pub mod window;

pub use decision::{AccessController, AccessEdge, AccessState};
pub use window::RollingWindow;
