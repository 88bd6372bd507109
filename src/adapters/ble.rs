//! BLE cadence sensor link.
//!
//! Implements [`SensorLink`] for a standard CSC sensor.
//!
//! ## Feature gating
//!
//! - **`ble`**: real transport via btleplug, driven from a private tokio
//!   runtime. Notifications are forwarded into a std channel so the engine
//!   side stays synchronous.
//! - **without `ble`**: a host simulation that synthesizes valid CSC frames
//!   at a settable cadence, for tests and dry runs.
//!
//! The engine does not perform discovery UX: it scans only to locate the
//! configured identifier (MAC address, or name substring as fallback).

use std::time::Duration;

use crate::config::EngineConfig;

/// Which sensor to connect to.
#[derive(Debug, Clone)]
pub struct SensorTarget {
    /// BLE MAC, e.g. `F1:2A:33:44:55:66`. Preferred when non-empty.
    pub address: String,
    /// Case-insensitive name substring, used when no address is configured.
    pub name: String,
    /// How long one scan attempt may take.
    pub scan_timeout: Duration,
}

impl SensorTarget {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            address: config.sensor_address.clone(),
            name: config.sensor_name.clone(),
            scan_timeout: Duration::from_secs(u64::from(config.ble_scan_timeout_secs)),
        }
    }

    // Only the real transport scans; the simulation accepts any target.
    #[cfg_attr(not(feature = "ble"), allow(dead_code))]
    fn matches(&self, address: &str, local_name: Option<&str>) -> bool {
        if !self.address.is_empty() {
            return address.eq_ignore_ascii_case(&self.address);
        }
        if self.name.is_empty() {
            return false;
        }
        local_name
            .map(str::to_lowercase)
            .is_some_and(|n| n.contains(&self.name.to_lowercase()))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Real transport (feature = "ble")
// ═══════════════════════════════════════════════════════════════

#[cfg(feature = "ble")]
mod transport {
    use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
    use std::time::{Duration, Instant};

    use btleplug::api::bleuuid::uuid_from_u16;
    use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
    use btleplug::platform::{Manager, Peripheral};
    use futures_lite::StreamExt;
    use log::{debug, info, warn};

    use super::SensorTarget;
    use crate::app::ports::SensorLink;
    use crate::error::LinkError;

    /// Cycling Speed and Cadence service (0x1816).
    const CSC_SERVICE_U16: u16 = 0x1816;
    /// CSC Measurement characteristic (0x2A5B).
    const CSC_MEASUREMENT_U16: u16 = 0x2A5B;

    const SCAN_POLL: Duration = Duration::from_millis(500);

    /// BLE sensor link backed by btleplug.
    pub struct BleSensorLink {
        target: SensorTarget,
        runtime: tokio::runtime::Runtime,
        peripheral: Option<Peripheral>,
        notifications: Option<Receiver<Vec<u8>>>,
    }

    impl BleSensorLink {
        pub fn new(target: SensorTarget) -> Result<Self, LinkError> {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("ble-transport")
                .enable_all()
                .build()
                .map_err(|e| LinkError::SensorConnect(e.to_string()))?;
            Ok(Self {
                target,
                runtime,
                peripheral: None,
                notifications: None,
            })
        }

        /// Scan until the configured sensor shows up or the window closes.
        async fn find_peripheral(target: &SensorTarget) -> Result<Peripheral, LinkError> {
            let manager = Manager::new()
                .await
                .map_err(|e| LinkError::SensorConnect(e.to_string()))?;
            let central = manager
                .adapters()
                .await
                .map_err(|e| LinkError::SensorConnect(e.to_string()))?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    LinkError::SensorConnect("no Bluetooth adapter present".to_string())
                })?;

            central
                .start_scan(ScanFilter::default())
                .await
                .map_err(|e| LinkError::SensorConnect(e.to_string()))?;

            let deadline = Instant::now() + target.scan_timeout;
            let found = loop {
                let peripherals = central
                    .peripherals()
                    .await
                    .map_err(|e| LinkError::SensorConnect(e.to_string()))?;

                let mut hit = None;
                for p in peripherals {
                    let props = p.properties().await.ok().flatten();
                    let address = p.address().to_string();
                    let local_name = props.as_ref().and_then(|p| p.local_name.as_deref());
                    debug!("scan: {} ({:?})", address, local_name);
                    if target.matches(&address, local_name) {
                        info!("found sensor {} ({:?})", address, local_name);
                        hit = Some(p);
                        break;
                    }
                }
                if let Some(p) = hit {
                    break Some(p);
                }
                if Instant::now() >= deadline {
                    break None;
                }
                tokio::time::sleep(SCAN_POLL).await;
            };

            if let Err(e) = central.stop_scan().await {
                debug!("stop_scan failed (ignored): {e}");
            }
            found.ok_or(LinkError::SensorNotFound)
        }
    }

    impl SensorLink for BleSensorLink {
        fn connect(&mut self) -> Result<(), LinkError> {
            self.disconnect();

            let measurement = uuid_from_u16(CSC_MEASUREMENT_U16);
            let (tx, rx) = channel();

            let peripheral = self.runtime.block_on(async {
                let peripheral = Self::find_peripheral(&self.target).await?;

                peripheral
                    .connect()
                    .await
                    .map_err(|e| LinkError::SensorConnect(e.to_string()))?;
                peripheral
                    .discover_services()
                    .await
                    .map_err(|e| LinkError::SensorConnect(e.to_string()))?;

                let characteristic = peripheral
                    .characteristics()
                    .into_iter()
                    .find(|c| c.uuid == measurement)
                    .ok_or_else(|| {
                        LinkError::SensorConnect(format!(
                            "device lacks CSC measurement characteristic (service {:#06x})",
                            CSC_SERVICE_U16
                        ))
                    })?;

                peripheral
                    .subscribe(&characteristic)
                    .await
                    .map_err(|e| LinkError::SensorConnect(e.to_string()))?;

                let mut stream = peripheral
                    .notifications()
                    .await
                    .map_err(|e| LinkError::SensorConnect(e.to_string()))?;

                tokio::spawn(async move {
                    while let Some(notification) = stream.next().await {
                        if notification.uuid != measurement {
                            continue;
                        }
                        if tx.send(notification.value).is_err() {
                            break;
                        }
                    }
                    // Stream end means the peripheral dropped; the closed
                    // channel surfaces as SensorLost on the engine side.
                });

                Ok::<Peripheral, LinkError>(peripheral)
            })?;

            info!("subscribed to cadence notifications");
            self.peripheral = Some(peripheral);
            self.notifications = Some(rx);
            Ok(())
        }

        fn recv_notification(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, LinkError> {
            let Some(rx) = &self.notifications else {
                return Err(LinkError::SensorLost);
            };
            match rx.recv_timeout(timeout) {
                Ok(payload) => Ok(Some(payload)),
                Err(RecvTimeoutError::Timeout) => {
                    if self.is_connected() {
                        Ok(None)
                    } else {
                        Err(LinkError::SensorLost)
                    }
                }
                Err(RecvTimeoutError::Disconnected) => Err(LinkError::SensorLost),
            }
        }

        fn is_connected(&self) -> bool {
            match &self.peripheral {
                Some(p) => self.runtime.block_on(p.is_connected()).unwrap_or(false),
                None => false,
            }
        }

        fn disconnect(&mut self) {
            self.notifications = None;
            if let Some(p) = self.peripheral.take() {
                if let Err(e) = self.runtime.block_on(p.disconnect()) {
                    warn!("disconnect failed (ignored): {e}");
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Host simulation (no "ble" feature)
// ═══════════════════════════════════════════════════════════════

#[cfg(not(feature = "ble"))]
mod transport {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    use log::info;

    use super::SensorTarget;
    use crate::app::ports::SensorLink;
    use crate::error::LinkError;

    /// Simulated cadence in centi-RPM, settable from tests or the
    /// `PEDALGATE_SIM_RPM` environment variable on connect.
    static SIM_RPM_CENTI: AtomicU32 = AtomicU32::new(0);

    /// Set the simulated cadence (host builds only).
    pub fn sim_set_rpm(rpm: f32) {
        SIM_RPM_CENTI.store((rpm.max(0.0) * 100.0) as u32, Ordering::Relaxed);
    }

    /// Simulated sensor link: emits one synthetic CSC frame per receive
    /// window, with crank counters advancing at the configured cadence.
    pub struct BleSensorLink {
        #[allow(dead_code)]
        target: SensorTarget,
        connected: bool,
        last_emit: Option<Instant>,
        rev_accum: f64,
        time_unit_accum: f64,
    }

    impl BleSensorLink {
        pub fn new(target: SensorTarget) -> Result<Self, LinkError> {
            Ok(Self {
                target,
                connected: false,
                last_emit: None,
                rev_accum: 0.0,
                time_unit_accum: 0.0,
            })
        }
    }

    impl SensorLink for BleSensorLink {
        fn connect(&mut self) -> Result<(), LinkError> {
            if let Ok(v) = std::env::var("PEDALGATE_SIM_RPM") {
                if let Ok(rpm) = v.parse::<f32>() {
                    sim_set_rpm(rpm);
                }
            }
            self.connected = true;
            self.last_emit = None;
            info!("sensor(sim): connected (cadence knob at {:.1} RPM)",
                SIM_RPM_CENTI.load(Ordering::Relaxed) as f32 / 100.0);
            Ok(())
        }

        fn recv_notification(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, LinkError> {
            if !self.connected {
                return Err(LinkError::SensorLost);
            }
            thread::sleep(timeout);

            let now = Instant::now();
            let elapsed = self
                .last_emit
                .map_or(timeout, |t| now.saturating_duration_since(t));
            self.last_emit = Some(now);

            let rpm = f64::from(SIM_RPM_CENTI.load(Ordering::Relaxed)) / 100.0;
            self.rev_accum += rpm / 60.0 * elapsed.as_secs_f64();
            self.time_unit_accum += elapsed.as_secs_f64() * 1024.0;

            let revs = (self.rev_accum as u64 & 0xFFFF) as u16;
            let event_time = (self.time_unit_accum as u64 & 0xFFFF) as u16;

            let mut frame = vec![0x02]; // crank data present
            frame.extend_from_slice(&revs.to_le_bytes());
            frame.extend_from_slice(&event_time.to_le_bytes());
            Ok(Some(frame))
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }
    }
}

pub use transport::BleSensorLink;
#[cfg(not(feature = "ble"))]
pub use transport::sim_set_rpm;
