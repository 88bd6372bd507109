//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the business rules for the PedalGate engine:
//! sample ingestion, rolling-average smoothing, the access decision
//! machine, and edge-driven actuator convergence. All interaction with
//! the outside world happens through **port traits** defined in [`ports`],
//! keeping this layer fully testable without a sensor or a controller.

pub mod events;
pub mod ports;
pub mod service;
