//! Integration tests: EngineService → decision machine → actuator, plus one
//! full EngineLoop run with real threads.
//!
//! The service-level scenarios drive `tick()` with synthetic `Instant`s so
//! the timelines are exact and nothing sleeps; only the loop test uses real
//! time, with intervals small enough to finish in well under a second.

use std::time::{Duration, Instant};

use pedalgate::LinkError;
use pedalgate::app::events::AppEvent;
use pedalgate::app::ports::{ActuatorLink, EventSink, SensorLink};
use pedalgate::app::service::EngineService;
use pedalgate::config::EngineConfig;
use pedalgate::control::AccessState;
use pedalgate::sensors::CadenceSample;

// ── Mock implementations ──────────────────────────────────────

struct RecordingActuator {
    /// Every `set_access` attempt, in order.
    calls: Vec<AccessState>,
    /// Successful (acknowledged) calls only.
    acked: Vec<AccessState>,
    fail: bool,
    /// When set, a repeated call with the already-acknowledged state errors.
    fail_on_redundant: bool,
}

impl RecordingActuator {
    fn new() -> Self {
        Self {
            calls: Vec::new(),
            acked: Vec::new(),
            fail: false,
            fail_on_redundant: false,
        }
    }

    fn strict() -> Self {
        Self {
            fail_on_redundant: true,
            ..Self::new()
        }
    }
}

impl ActuatorLink for RecordingActuator {
    fn verify(&mut self) -> Result<Option<AccessState>, LinkError> {
        Ok(self.acked.last().copied())
    }

    fn set_access(&mut self, state: AccessState) -> Result<(), LinkError> {
        self.calls.push(state);
        if self.fail {
            return Err(LinkError::ActuatorRequest("controller offline".to_string()));
        }
        if self.fail_on_redundant && self.acked.last() == Some(&state) {
            return Err(LinkError::ActuatorRequest(format!(
                "redundant toggle to {}",
                state.as_str()
            )));
        }
        self.acked.push(state);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Vec<AppEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

impl RecordingSink {
    fn decision_changes(&self) -> Vec<(AccessState, AccessState)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::DecisionChanged { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        threshold_rpm: 60.0,
        grace_period_secs: 3,
        window_secs: 5,
        tick_interval_ms: 1000,
        sensor_liveness_timeout_secs: 10,
        unifi_username: "test".to_string(),
        unifi_password: "test".to_string(),
        ..Default::default()
    }
}

fn sample(rpm: f32, at: Instant) -> CadenceSample {
    CadenceSample {
        rpm,
        observed_at: at,
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

// ── End-to-end decision timeline ──────────────────────────────

/// Threshold 60, grace 3 s, window 5 s, one sample per second: three zeros
/// then sustained 65s. The averaged cadence first clears the threshold when
/// the last zero ages out of the window (t=8), the pending Allow starts
/// there, and the commit lands exactly when the grace period elapses (t=11).
/// Nothing commits earlier, and it commits exactly once.
#[test]
fn sustained_cadence_commits_allow_once_after_window_and_grace() {
    let mut svc = EngineService::new(&config());
    let mut act = RecordingActuator::strict();
    let mut sink = RecordingSink::default();
    let t0 = Instant::now();

    svc.start(&mut sink);
    svc.sensor_connected(t0);

    let mut edge_ticks = Vec::new();
    for i in 0..=14u64 {
        let now = t0 + secs(i);
        let rpm = if i < 3 { 0.0 } else { 65.0 };
        svc.ingest_sample(sample(rpm, now));

        let before = sink.decision_changes().len();
        let snap = svc.tick(now, &mut act, &mut sink);
        if sink.decision_changes().len() > before {
            edge_ticks.push(i);
        }

        if i < 11 {
            assert_eq!(
                snap.decision,
                AccessState::Block,
                "no commit may happen before the grace period elapses (t={i})"
            );
        }
    }

    assert_eq!(edge_ticks, vec![11], "exactly one commit, at t=11");
    assert_eq!(
        sink.decision_changes(),
        vec![(AccessState::Block, AccessState::Allow)]
    );
    // Fail-safe enforcement first, then the single Allow toggle. The strict
    // mock proves no redundant call was ever issued.
    assert_eq!(act.acked, vec![AccessState::Block, AccessState::Allow]);
}

/// A dip under the threshold that recovers before the grace period elapses
/// is noise: no commit, no actuator call. A short window (1 s) lets the
/// average recover within the 3 s grace.
#[test]
fn momentary_dip_is_debounced() {
    let cfg = EngineConfig {
        window_secs: 1,
        ..config()
    };
    let mut svc = EngineService::new(&cfg);
    let mut act = RecordingActuator::strict();
    let mut sink = RecordingSink::default();
    let t0 = Instant::now();

    svc.sensor_connected(t0);

    // Ride up to Allow. Constant 65s: pending at t=0 commits at t=3.
    let mut i = 0u64;
    while svc.decision() != AccessState::Allow {
        let now = t0 + secs(i);
        svc.ingest_sample(sample(65.0, now));
        svc.tick(now, &mut act, &mut sink);
        i += 1;
        assert!(i < 20, "must reach Allow");
    }
    let calls_after_allow = act.calls.len();

    // One weak pedal stroke drags the 1 s average under the threshold for
    // two ticks; the 65s that follow clear the pending Block inside grace.
    let now = t0 + secs(i);
    svc.ingest_sample(sample(30.0, now));
    svc.tick(now, &mut act, &mut sink);
    i += 1;

    for _ in 0..10 {
        let now = t0 + secs(i);
        svc.ingest_sample(sample(65.0, now));
        svc.tick(now, &mut act, &mut sink);
        i += 1;
    }

    assert_eq!(svc.decision(), AccessState::Allow);
    assert_eq!(
        act.calls.len(),
        calls_after_allow,
        "a debounced dip must not touch the actuator"
    );
}

// ── Fail-safe behavior ────────────────────────────────────────

/// Sensor loss drives the decision to Block after the grace period, even
/// when the last known cadence was comfortably above the threshold.
#[test]
fn sensor_loss_fails_safe_to_block() {
    let mut svc = EngineService::new(&config());
    let mut act = RecordingActuator::strict();
    let mut sink = RecordingSink::default();
    let t0 = Instant::now();

    svc.sensor_connected(t0);
    for i in 0..5u64 {
        let now = t0 + secs(i);
        svc.ingest_sample(sample(90.0, now));
        svc.tick(now, &mut act, &mut sink);
    }
    assert_eq!(svc.decision(), AccessState::Allow);

    svc.sensor_disconnected();
    let mut committed_at = None;
    for i in 5..15u64 {
        let now = t0 + secs(i);
        let before = sink.decision_changes().len();
        svc.tick(now, &mut act, &mut sink);
        if sink.decision_changes().len() > before {
            committed_at = Some(i);
            break;
        }
    }

    // Disconnected at t=5: pending Block starts on the first tick after the
    // drop and commits once the 3 s grace elapses.
    assert_eq!(committed_at, Some(8));
    assert_eq!(svc.decision(), AccessState::Block);
    assert_eq!(act.acked.last(), Some(&AccessState::Block));
}

/// A sensor that stays "connected" but goes silent past the liveness
/// timeout is treated as dead: health, not raw cadence, selects the target.
#[test]
fn silent_sensor_triggers_block_despite_high_average() {
    let cfg = EngineConfig {
        window_secs: 60, // keep the stale average high on purpose
        ..config()
    };
    let mut svc = EngineService::new(&cfg);
    let mut act = RecordingActuator::strict();
    let mut sink = RecordingSink::default();
    let t0 = Instant::now();

    svc.sensor_connected(t0);
    for i in 0..=5u64 {
        let now = t0 + secs(i);
        svc.ingest_sample(sample(80.0, now));
        svc.tick(now, &mut act, &mut sink);
    }
    assert_eq!(svc.decision(), AccessState::Allow);

    // No more samples, transport never reports a drop.
    let mut committed_at = None;
    for i in 6..25u64 {
        let now = t0 + secs(i);
        let before = sink.decision_changes().len();
        let snap = svc.tick(now, &mut act, &mut sink);
        if sink.decision_changes().len() > before {
            assert!(
                snap.averaged_rpm >= cfg.threshold_rpm,
                "the stale average must still be high when liveness wins"
            );
            committed_at = Some(i);
            break;
        }
    }

    // Last sample at t=5, liveness 10 s: unhealthy first at t=16, pending
    // Block commits at t=19.
    assert_eq!(committed_at, Some(19));
    assert_eq!(svc.decision(), AccessState::Block);
}

// ── Actuator outage: retry and coalescing ─────────────────────

/// The committed decision is authoritative: during an actuator outage the
/// engine retries the committed state once per tick, and recovery applies
/// it exactly once.
#[test]
fn actuator_outage_catches_up_with_the_committed_decision() {
    let mut svc = EngineService::new(&config());
    let mut act = RecordingActuator::new();
    let mut sink = RecordingSink::default();
    let t0 = Instant::now();

    svc.sensor_connected(t0);

    // Initial Block lands while the controller is still up.
    svc.tick(t0, &mut act, &mut sink);
    assert_eq!(act.acked, vec![AccessState::Block]);

    // Controller goes down; rider pedals up to an Allow commit at t=4.
    act.fail = true;
    let mut i = 1u64;
    while svc.decision() != AccessState::Allow {
        let now = t0 + secs(i);
        svc.ingest_sample(sample(80.0, now));
        svc.tick(now, &mut act, &mut sink);
        i += 1;
        assert!(i < 20, "must reach Allow");
    }
    assert_eq!(act.acked, vec![AccessState::Block], "nothing lands while down");

    // Each further tick retries exactly once.
    let calls_before = act.calls.len();
    for _ in 0..3 {
        let now = t0 + secs(i);
        svc.ingest_sample(sample(80.0, now));
        svc.tick(now, &mut act, &mut sink);
        i += 1;
    }
    assert_eq!(act.calls.len(), calls_before + 3, "one retry per tick");
    assert!(act.calls[calls_before..].iter().all(|s| *s == AccessState::Allow));

    // Recovery: exactly one catch-up call with the committed decision.
    act.fail = false;
    let now = t0 + secs(i);
    svc.ingest_sample(sample(80.0, now));
    svc.tick(now, &mut act, &mut sink);
    assert_eq!(act.acked, vec![AccessState::Block, AccessState::Allow]);

    // Converged: the next tick is silent.
    let calls = act.calls.len();
    let now = t0 + secs(i + 1);
    svc.ingest_sample(sample(80.0, now));
    svc.tick(now, &mut act, &mut sink);
    assert_eq!(act.calls.len(), calls);
}

/// Decisions committed and superseded during an outage are never replayed:
/// the actuator converges straight to the latest one.
#[test]
fn superseded_decision_is_never_applied_after_recovery() {
    let mut svc = EngineService::new(&config());
    let mut act = RecordingActuator::new();
    let mut sink = RecordingSink::default();
    let t0 = Instant::now();

    svc.sensor_connected(t0);
    svc.tick(t0, &mut act, &mut sink); // initial Block lands

    // Outage spans an Allow commit followed by a Block commit.
    act.fail = true;
    let mut i = 1u64;
    while svc.decision() != AccessState::Allow {
        let now = t0 + secs(i);
        svc.ingest_sample(sample(80.0, now));
        svc.tick(now, &mut act, &mut sink);
        i += 1;
        assert!(i < 20);
    }
    while svc.decision() != AccessState::Block {
        let now = t0 + secs(i);
        svc.ingest_sample(sample(0.0, now));
        svc.tick(now, &mut act, &mut sink);
        i += 1;
        assert!(i < 40);
    }

    // Recovery: the backend already holds Block (the Allow never landed),
    // so convergence needs no call at all, and the superseded Allow is
    // certainly never sent.
    act.fail = false;
    let calls_before = act.calls.len();
    svc.tick(t0 + secs(i), &mut act, &mut sink);
    assert_eq!(act.acked, vec![AccessState::Block]);
    assert_eq!(
        act.calls.len(),
        calls_before,
        "no redundant toggle when the backend already matches"
    );
}

/// Health transitions surface as events exactly on the edges.
#[test]
fn health_transitions_are_reported_once() {
    let mut svc = EngineService::new(&config());
    let mut act = RecordingActuator::new();
    let mut sink = RecordingSink::default();
    let t0 = Instant::now();

    svc.sensor_connected(t0);
    svc.ingest_sample(sample(65.0, t0));
    svc.tick(t0, &mut act, &mut sink);
    svc.tick(t0 + secs(1), &mut act, &mut sink);

    let sensor_ups = sink
        .events
        .iter()
        .filter(|e| matches!(e, AppEvent::SensorHealthChanged { healthy: true }))
        .count();
    let actuator_ups = sink
        .events
        .iter()
        .filter(|e| matches!(e, AppEvent::ActuatorHealthChanged { healthy: true }))
        .count();
    assert_eq!(sensor_ups, 1, "steady health must not re-emit events");
    assert_eq!(actuator_ups, 1);
}

// ── Full engine loop with real threads ────────────────────────

mod engine_loop {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{Sender, channel};
    use std::thread;

    use pedalgate::engine::EngineLoop;
    use pedalgate::status::StatusHandle;

    /// Sensor link that emits one CSC frame per receive window, each frame
    /// advancing the crank counters by 2 revolutions per simulated second
    /// (a steady 120 RPM as the decoder sees it).
    struct ScriptedSensorLink {
        connected: bool,
        revs: u16,
        time_units: u16,
    }

    impl ScriptedSensorLink {
        fn new() -> Self {
            Self {
                connected: false,
                revs: 0,
                time_units: 0,
            }
        }
    }

    impl SensorLink for ScriptedSensorLink {
        fn connect(&mut self) -> Result<(), LinkError> {
            self.connected = true;
            Ok(())
        }

        fn recv_notification(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, LinkError> {
            thread::sleep(timeout.min(Duration::from_millis(20)));
            self.revs = self.revs.wrapping_add(2);
            self.time_units = self.time_units.wrapping_add(1024);

            let mut frame = vec![0x02];
            frame.extend_from_slice(&self.revs.to_le_bytes());
            frame.extend_from_slice(&self.time_units.to_le_bytes());
            Ok(Some(frame))
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }
    }

    /// Actuator that reports every acknowledged state over a channel.
    struct ChannelActuator {
        tx: Sender<AccessState>,
    }

    impl ActuatorLink for ChannelActuator {
        fn verify(&mut self) -> Result<Option<AccessState>, LinkError> {
            Ok(None)
        }

        fn set_access(&mut self, state: AccessState) -> Result<(), LinkError> {
            let _ = self.tx.send(state);
            Ok(())
        }
    }

    struct NullSink;
    impl EventSink for NullSink {
        fn emit(&mut self, _event: &AppEvent) {}
    }

    #[test]
    fn loop_pumps_samples_and_unblocks() {
        let cfg = EngineConfig {
            threshold_rpm: 60.0,
            grace_period_secs: 0,
            window_secs: 2,
            tick_interval_ms: 25,
            sensor_liveness_timeout_secs: 2,
            unifi_username: "test".to_string(),
            unifi_password: "test".to_string(),
            ..Default::default()
        };

        let (tx, rx) = channel();
        let status = StatusHandle::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        let engine = EngineLoop::new(cfg, ChannelActuator { tx }, NullSink, status.clone());
        let sensor = ScriptedSensorLink::new();

        let loop_shutdown = Arc::clone(&shutdown);
        let handle = thread::spawn(move || engine.run(sensor, &loop_shutdown));

        // Fail-safe Block must be the first applied state.
        let first = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("initial enforcement");
        assert_eq!(first, AccessState::Block);

        // Sustained 120 RPM at grace 0 must produce an Allow.
        let second = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("allow after sustained cadence");
        assert_eq!(second, AccessState::Allow);

        let snapshot = status.snapshot();
        assert!(snapshot.last_update_unix_ms > 0, "status must be refreshed");

        shutdown.store(true, Ordering::Relaxed);
        handle.join().expect("engine loop joins cleanly");

        let final_snapshot = status.snapshot();
        assert_eq!(final_snapshot.decision, AccessState::Allow);
        assert!(final_snapshot.sensor_healthy);
        assert!(final_snapshot.actuator_healthy);
    }
}
