//! Driven adapters: implementations of the port traits against the real
//! world. The BLE transport is feature-gated (`ble`); the UniFi client and
//! the log sink build everywhere.

pub mod ble;
pub mod log_sink;
pub mod unifi;
