//! PedalGate daemon entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                    │
//! │                                                              │
//! │  BleSensorLink      UniFiActuator        LogEventSink        │
//! │  (SensorLink)       (ActuatorLink)       (EventSink)         │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ───────────────────     │
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │            EngineService (pure logic)                │    │
//! │  │  Decoder · Window · Decision · Health                │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! │                                                              │
//! │  EngineLoop (pump thread + evaluation tick) · StatusHandle   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use log::{info, warn};

use pedalgate::adapters::ble::{BleSensorLink, SensorTarget};
use pedalgate::adapters::log_sink::LogEventSink;
use pedalgate::adapters::unifi::UniFiActuator;
use pedalgate::app::ports::ActuatorLink;
use pedalgate::config::EngineConfig;
use pedalgate::engine::EngineLoop;
use pedalgate::status::StatusHandle;

fn main() -> Result<()> {
    // ── 1. Logger ─────────────────────────────────────────────
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("PedalGate v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Configuration (fatal on error) ─────────────────────
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref())
        .context("loading configuration")?;
    config.validate().context("validating configuration")?;
    config.log_summary();

    // ── 3. Actuator adapter + startup verification ────────────
    let mut actuator = UniFiActuator::from_config(&config)
        .context("building the controller client")?;
    match actuator.verify() {
        Ok(state) => {
            info!(
                "controller reachable, rule currently {}",
                state.map_or("unknown", |s| s.as_str())
            );
        }
        Err(pedalgate::LinkError::RuleNotFound(name)) => {
            // Nothing to toggle: create the rule first.
            anyhow::bail!(
                "firewall rule '{name}' not found on the controller; create it before starting"
            );
        }
        Err(e) => {
            // Recoverable: the engine retries and enforces BLOCK on the
            // first tick once the controller comes back.
            warn!("controller verification failed ({e}), continuing with retries");
        }
    }

    // ── 4. Sensor adapter ─────────────────────────────────────
    let sensor = BleSensorLink::new(SensorTarget::from_config(&config))
        .context("building the sensor link")?;

    // ── 5. Shutdown flag (SIGINT/SIGTERM) ─────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context("registering signal handler")?;
    }

    // ── 6. Engine ─────────────────────────────────────────────
    let status = StatusHandle::new();
    // `status` stays cloneable here for the dashboard process; the engine
    // publishes into it every tick.
    let engine = EngineLoop::new(config, actuator, LogEventSink::new(), status.clone());

    info!("engine starting; pedal to unlock");
    engine.run(sensor, &shutdown);

    info!("bye");
    Ok(())
}
