//! Engine loop: link lifecycles, the sample pump, and the evaluation tick.
//!
//! Two cooperating threads:
//!
//! ```text
//! ┌──────────────┐   bounded queue    ┌─────────────────────┐
//! │ sensor pump   │ ────────────────▶ │ evaluation loop      │
//! │ recv → decode │  Sample/LinkUp/   │ drain → tick(1 Hz) → │
//! │ reconnect     │  LinkDown         │ actuator / status    │
//! └──────────────┘                    └─────────────────────┘
//! ```
//!
//! The pump owns the sensor link and its per-connection counter state; the
//! evaluation loop owns everything else. They communicate only through the
//! queue, so ordering is preserved and there is no callback re-entrancy.
//! The evaluation tick fires on a fixed interval even when no notifications
//! arrive: grace-period expiry and the silent-sensor cutoff are time-driven.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{RecvTimeoutError, SyncSender, TrySendError, sync_channel};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{ActuatorLink, EventSink, SensorLink};
use crate::app::service::EngineService;
use crate::config::EngineConfig;
use crate::health::Backoff;
use crate::sensors::{CrankCounterState, decode_csc_measurement};
use crate::status::StatusHandle;

/// Decoded samples waiting for the evaluation tick. Sized for several
/// seconds of the fastest plausible notification rate; overflow drops the
/// newest sample with a warning rather than blocking the pump.
const SAMPLE_QUEUE_CAP: usize = 64;

/// How long a single `recv_notification` may block before the pump
/// re-checks its stop flag.
const RECV_POLL: Duration = Duration::from_millis(250);

/// How long shutdown waits for the pump thread before abandoning it.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages from the pump to the evaluation loop.
enum PumpEvent {
    Sample(crate::sensors::CadenceSample),
    LinkUp,
    LinkDown,
}

/// The owning orchestrator: wires sensor pump, engine service, actuator,
/// and the published status together.
pub struct EngineLoop<A, S> {
    config: EngineConfig,
    service: EngineService,
    actuator: A,
    sink: S,
    status: StatusHandle,
}

impl<A: ActuatorLink, S: EventSink> EngineLoop<A, S> {
    pub fn new(config: EngineConfig, actuator: A, sink: S, status: StatusHandle) -> Self {
        let service = EngineService::new(&config);
        Self {
            config,
            service,
            actuator,
            sink,
            status,
        }
    }

    /// Run until `shutdown` goes true. Owns the sensor link for the whole
    /// run; on exit the link is torn down and the pump joined with a
    /// bounded timeout.
    pub fn run<L>(mut self, sensor: L, shutdown: &Arc<AtomicBool>)
    where
        L: SensorLink + Send + 'static,
    {
        let (tx, rx) = sync_channel::<PumpEvent>(SAMPLE_QUEUE_CAP);
        let pump_stop = Arc::new(AtomicBool::new(false));

        let pump = {
            let stop = Arc::clone(&pump_stop);
            thread::Builder::new()
                .name("sensor-pump".to_string())
                .spawn(move || pump_loop(sensor, &tx, &stop))
                .expect("spawning the sensor pump thread")
        };

        self.service.start(&mut self.sink);

        let tick = self.config.tick_interval();
        let mut next_tick = Instant::now() + tick;
        let mut pump_alive = true;

        while !shutdown.load(Ordering::Relaxed) {
            // Drain pump events until the tick deadline.
            let now = Instant::now();
            if now < next_tick {
                if pump_alive {
                    match rx.recv_timeout(next_tick - now) {
                        Ok(event) => {
                            self.handle_pump_event(event);
                            continue;
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => {
                            // Only happens if the pump died; fail safe and
                            // keep enforcing decisions without samples.
                            error!("sensor pump terminated unexpectedly");
                            self.service.sensor_disconnected();
                            pump_alive = false;
                        }
                    }
                } else {
                    thread::sleep(next_tick - now);
                }
            }

            // Evaluation tick.
            let snapshot = self
                .service
                .tick(Instant::now(), &mut self.actuator, &mut self.sink);
            self.status.publish(snapshot);

            let every = u64::from(self.config.status_log_every_ticks.max(1));
            if self.service.tick_count() % every == 0 {
                self.sink.emit(&AppEvent::Status(snapshot));
            }

            next_tick += tick;
            // A slow actuator call can push us past one or more deadlines;
            // skip the missed ticks instead of bursting to catch up.
            let now = Instant::now();
            while next_tick <= now {
                next_tick += tick;
            }
        }

        info!("shutting down");
        pump_stop.store(true, Ordering::Relaxed);
        drop(rx);

        let deadline = Instant::now() + SHUTDOWN_JOIN_TIMEOUT;
        while !pump.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(25));
        }
        if pump.is_finished() {
            let _ = pump.join();
            info!("shutdown complete");
        } else {
            // In-flight BLE teardown gets a bounded window, then is
            // abandoned; no state survives the process anyway.
            warn!("sensor pump did not stop within {SHUTDOWN_JOIN_TIMEOUT:?}, abandoning it");
        }
    }

    fn handle_pump_event(&mut self, event: PumpEvent) {
        match event {
            PumpEvent::Sample(sample) => {
                debug!("sample: {:.1} RPM", sample.rpm);
                self.service.ingest_sample(sample);
            }
            PumpEvent::LinkUp => self.service.sensor_connected(Instant::now()),
            PumpEvent::LinkDown => self.service.sensor_disconnected(),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Sensor pump
// ───────────────────────────────────────────────────────────────

/// Producer side: owns the sensor link, reconnects with bounded backoff,
/// decodes notifications, and pushes samples into the queue.
fn pump_loop<L: SensorLink>(mut sensor: L, tx: &SyncSender<PumpEvent>, stop: &AtomicBool) {
    let mut counters = CrankCounterState::new();
    let mut backoff = Backoff::new();
    let mut connected = false;

    while !stop.load(Ordering::Relaxed) {
        if !connected {
            match sensor.connect() {
                Ok(()) => {
                    connected = true;
                    backoff.reset();
                    // Counters are not comparable across connections.
                    counters.reset();
                    info!("sensor: connected");
                    if tx.send(PumpEvent::LinkUp).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!("sensor: connect failed ({e}), retrying in {delay:?}");
                    sleep_interruptible(stop, delay);
                }
            }
            continue;
        }

        match sensor.recv_notification(RECV_POLL) {
            Ok(Some(payload)) => {
                match decode_csc_measurement(&payload, &mut counters, Instant::now()) {
                    Ok(Some(sample)) => match tx.try_send(PumpEvent::Sample(sample)) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            warn!("sample queue full, dropping a sample");
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    },
                    // No crank data, duplicate event time, or first frame
                    // after (re)connect: nothing to report.
                    Ok(None) => {}
                    Err(e) => warn!("sensor: discarding notification ({e})"),
                }
            }
            Ok(None) => {} // receive window elapsed; re-check stop flag
            Err(e) => {
                warn!("sensor: link lost ({e})");
                connected = false;
                sensor.disconnect();
                if tx.send(PumpEvent::LinkDown).is_err() {
                    break;
                }
            }
        }
    }

    sensor.disconnect();
    debug!("sensor pump exiting");
}

/// Sleep in short slices so shutdown is not held up by a long backoff.
fn sleep_interruptible(stop: &AtomicBool, total: Duration) {
    let slice = Duration::from_millis(100);
    let deadline = Instant::now() + total;
    while Instant::now() < deadline && !stop.load(Ordering::Relaxed) {
        thread::sleep(slice.min(deadline.saturating_duration_since(Instant::now())));
    }
}
