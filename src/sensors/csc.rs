//! CSC Measurement decoder.
//!
//! Parses the Cycling Speed and Cadence Measurement characteristic value
//! (Bluetooth SIG, 0x2A5B) into an instantaneous cadence sample:
//!
//! ```text
//! Byte 0        Flags
//!               bit 0: wheel revolution data present (6 bytes)
//!               bit 1: crank revolution data present (4 bytes)
//! [if bit 0]    Cumulative Wheel Revolutions (u32 LE)
//!               Last Wheel Event Time        (u16 LE, 1/1024 s)
//! [if bit 1]    Cumulative Crank Revolutions (u16 LE)
//!               Last Crank Event Time        (u16 LE, 1/1024 s)
//! ```
//!
//! The crank counters are hardware rollover counters: deltas must be taken
//! with unsigned 16-bit wraparound arithmetic, never plain subtraction.
//! Counters are not comparable across connections or sensor reboots, so the
//! per-connection [`CrankCounterState`] is reset on every (re)connect.

use std::time::Instant;

use crate::error::DecodeError;

const FLAG_WHEEL_REV_DATA: u8 = 0x01;
const FLAG_CRANK_REV_DATA: u8 = 0x02;

/// Wheel block: u32 cumulative revolutions + u16 event time.
const WHEEL_BLOCK_LEN: usize = 6;
/// Crank block: u16 cumulative revolutions + u16 event time.
const CRANK_BLOCK_LEN: usize = 4;

/// One decoded cadence reading. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CadenceSample {
    /// Instantaneous cadence in revolutions per minute. Never negative.
    pub rpm: f32,
    /// When the notification carrying this sample was received.
    pub observed_at: Instant,
}

/// Per-connection crank counter state.
///
/// Retained across notifications to compute deltas; discarded whenever a new
/// sensor connection is established.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrankCounterState {
    last_crank_revolutions: u16,
    /// 1/1024-second units.
    last_event_time: u16,
    /// False until the first crank-bearing notification seeds the counters.
    primed: bool,
}

impl CrankCounterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous counters. Call on every fresh connection: the
    /// first notification afterwards only seeds state and yields no sample.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Decode one CSC Measurement notification.
///
/// Returns `Ok(None)` when the notification carries no crank data, when the
/// counters are not yet primed, or when zero time elapsed since the previous
/// crank event (duplicate notification; RPM is undefined there and must not
/// be computed). Counter state advances to the observed raw values in every
/// successfully parsed crank-bearing notification, including the `None`
/// cases. A malformed payload leaves the state untouched.
pub fn decode_csc_measurement(
    payload: &[u8],
    counters: &mut CrankCounterState,
    observed_at: Instant,
) -> Result<Option<CadenceSample>, DecodeError> {
    let flags = *payload.first().ok_or(DecodeError::Empty)?;

    if flags & FLAG_CRANK_REV_DATA == 0 {
        return Ok(None);
    }

    // The crank block sits after the wheel block when both are present.
    let mut offset = 1;
    if flags & FLAG_WHEEL_REV_DATA != 0 {
        offset += WHEEL_BLOCK_LEN;
    }

    let expected = offset + CRANK_BLOCK_LEN;
    if payload.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: payload.len(),
        });
    }

    let crank_revolutions = u16::from_le_bytes([payload[offset], payload[offset + 1]]);
    let crank_event_time = u16::from_le_bytes([payload[offset + 2], payload[offset + 3]]);

    if !counters.primed {
        counters.last_crank_revolutions = crank_revolutions;
        counters.last_event_time = crank_event_time;
        counters.primed = true;
        return Ok(None);
    }

    // u16 rollover counters: wrapping arithmetic handles the wrap at 65536.
    let delta_revolutions = crank_revolutions.wrapping_sub(counters.last_crank_revolutions);
    let delta_time_units = crank_event_time.wrapping_sub(counters.last_event_time);

    counters.last_crank_revolutions = crank_revolutions;
    counters.last_event_time = crank_event_time;

    if delta_time_units == 0 {
        return Ok(None);
    }

    // delta_time_units is in 1/1024 s; scale revolutions-per-unit to RPM.
    let rpm = f32::from(delta_revolutions) * 60.0 * 1024.0 / f32::from(delta_time_units);

    Ok(Some(CadenceSample { rpm, observed_at }))
}
