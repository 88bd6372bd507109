//! Daemon configuration.
//!
//! All tunable parameters for the PedalGate engine. Values come from an
//! optional JSON config file, then `PEDALGATE_*` environment variables
//! override individual keys (the deployment story is a systemd unit with an
//! environment file). The engine never reloads configuration at runtime.

use std::path::Path;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Core daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // --- Cadence ---
    /// Averaged cadence (RPM) at or above which access is allowed.
    pub threshold_rpm: f32,
    /// Seconds a flipped target must persist before it is committed.
    pub grace_period_secs: u16,
    /// Rolling-average window duration (seconds).
    pub window_secs: u16,

    // --- Timing ---
    /// Evaluation tick interval (milliseconds).
    pub tick_interval_ms: u32,
    /// Seconds without a sensor notification before the link counts as dead.
    pub sensor_liveness_timeout_secs: u16,
    /// Emit a status log line every this many ticks.
    pub status_log_every_ticks: u32,

    // --- Sensor link ---
    /// BLE MAC of the cadence sensor. Optional when `sensor_name` is set.
    pub sensor_address: String,
    /// Case-insensitive name substring used when no address is configured.
    pub sensor_name: String,
    /// BLE scan window (seconds).
    pub ble_scan_timeout_secs: u16,

    // --- Actuator link (UniFi controller) ---
    pub unifi_host: String,
    pub unifi_port: u16,
    pub unifi_username: String,
    pub unifi_password: String,
    pub unifi_site: String,
    /// Verify the controller's TLS certificate (off by default: the stock
    /// controller ships a self-signed cert).
    pub unifi_verify_tls: bool,
    /// Firewall rule id. Resolved by name at startup when empty.
    pub firewall_rule_id: String,
    /// Rule name used for the startup lookup.
    pub firewall_rule_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Cadence
            threshold_rpm: 60.0,
            grace_period_secs: 3,
            window_secs: 5,

            // Timing
            tick_interval_ms: 1000, // 1 Hz
            sensor_liveness_timeout_secs: 10,
            status_log_every_ticks: 10,

            // Sensor
            sensor_address: String::new(),
            sensor_name: "Cadence".to_string(),
            ble_scan_timeout_secs: 10,

            // Actuator
            unifi_host: "192.168.1.1".to_string(),
            unifi_port: 8443,
            unifi_username: String::new(),
            unifi_password: String::new(),
            unifi_site: "default".to_string(),
            unifi_verify_tls: false,
            firewall_rule_id: String::new(),
            firewall_rule_name: "pedalgate-block".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration: defaults → JSON file (if given) → env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => {
                let raw =
                    std::fs::read_to_string(p).map_err(|e| ConfigError::Io(e.to_string()))?;
                serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override individual keys from `PEDALGATE_*` environment variables.
    fn apply_env_overrides(&mut self) {
        env_parse("PEDALGATE_THRESHOLD_RPM", &mut self.threshold_rpm);
        env_parse("PEDALGATE_GRACE_PERIOD_SECS", &mut self.grace_period_secs);
        env_parse("PEDALGATE_WINDOW_SECS", &mut self.window_secs);
        env_parse("PEDALGATE_TICK_INTERVAL_MS", &mut self.tick_interval_ms);
        env_parse(
            "PEDALGATE_SENSOR_LIVENESS_TIMEOUT_SECS",
            &mut self.sensor_liveness_timeout_secs,
        );
        env_parse(
            "PEDALGATE_STATUS_LOG_EVERY_TICKS",
            &mut self.status_log_every_ticks,
        );
        env_string("PEDALGATE_SENSOR_ADDRESS", &mut self.sensor_address);
        env_string("PEDALGATE_SENSOR_NAME", &mut self.sensor_name);
        env_parse("PEDALGATE_BLE_SCAN_TIMEOUT_SECS", &mut self.ble_scan_timeout_secs);
        env_string("PEDALGATE_UNIFI_HOST", &mut self.unifi_host);
        env_parse("PEDALGATE_UNIFI_PORT", &mut self.unifi_port);
        env_string("PEDALGATE_UNIFI_USERNAME", &mut self.unifi_username);
        env_string("PEDALGATE_UNIFI_PASSWORD", &mut self.unifi_password);
        env_string("PEDALGATE_UNIFI_SITE", &mut self.unifi_site);
        env_parse("PEDALGATE_UNIFI_VERIFY_TLS", &mut self.unifi_verify_tls);
        env_string("PEDALGATE_FIREWALL_RULE_ID", &mut self.firewall_rule_id);
        env_string("PEDALGATE_FIREWALL_RULE_NAME", &mut self.firewall_rule_name);
    }

    /// Validate before the engine starts. Invalid values are rejected, not
    /// clamped: a daemon that silently runs with a zero grace period is
    /// worse than one that refuses to start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold_rpm <= 0.0 || !self.threshold_rpm.is_finite() {
            return Err(ConfigError::Invalid("threshold_rpm must be a positive number"));
        }
        if self.window_secs == 0 {
            return Err(ConfigError::Invalid("window_secs must be at least 1"));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be at least 1"));
        }
        if u64::from(self.sensor_liveness_timeout_secs) * 1000 < u64::from(self.tick_interval_ms) {
            return Err(ConfigError::Invalid(
                "sensor_liveness_timeout_secs must cover at least one tick interval",
            ));
        }
        if self.unifi_username.is_empty() {
            return Err(ConfigError::Missing("unifi_username"));
        }
        if self.unifi_password.is_empty() {
            return Err(ConfigError::Missing("unifi_password"));
        }
        if self.sensor_address.is_empty() && self.sensor_name.is_empty() {
            return Err(ConfigError::Missing("sensor_address or sensor_name"));
        }
        Ok(())
    }

    /// Log the effective configuration, hiding credentials.
    pub fn log_summary(&self) {
        info!(
            "config: threshold={:.0} RPM, grace={}s, window={}s, tick={}ms, liveness={}s",
            self.threshold_rpm,
            self.grace_period_secs,
            self.window_secs,
            self.tick_interval_ms,
            self.sensor_liveness_timeout_secs,
        );
        info!(
            "config: sensor={} controller={}:{} site={} rule={}",
            if self.sensor_address.is_empty() {
                format!("name~'{}'", self.sensor_name)
            } else {
                self.sensor_address.clone()
            },
            self.unifi_host,
            self.unifi_port,
            self.unifi_site,
            if self.firewall_rule_id.is_empty() {
                format!("name='{}'", self.firewall_rule_name)
            } else {
                format!("id={}", self.firewall_rule_id)
            },
        );
    }

    // -- Derived durations ----------------------------------------------

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.grace_period_secs))
    }

    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.window_secs))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.tick_interval_ms))
    }

    pub fn sensor_liveness_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.sensor_liveness_timeout_secs))
    }
}

fn env_string(key: &str, slot: &mut String) {
    if let Ok(v) = std::env::var(key) {
        *slot = v;
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(v) = std::env::var(key) {
        if let Ok(parsed) = v.parse() {
            *slot = parsed;
        }
    }
}
