//! Sensor-side protocol logic.
//!
//! Only one sensor family is supported: standard Cycling Speed and Cadence
//! (CSC) over BLE. The decoder in [`csc`] is transport-agnostic; the BLE
//! plumbing lives in `adapters::ble`.

pub mod csc;

pub use csc::{CadenceSample, CrankCounterState, decode_csc_measurement};
