//! PedalGate daemon library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. The real BLE transport is guarded by the `ble` feature
//! inside `adapters::ble`; everything else builds and runs on any host.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod control;
pub mod engine;
pub mod health;
pub mod sensors;
pub mod status;

mod error;

pub mod adapters;

pub use error::{ConfigError, DecodeError, Error, LinkError, Result};
