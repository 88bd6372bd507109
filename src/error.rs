//! Unified error types for the PedalGate daemon.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! engine loop's error handling uniform. Decode and link errors are
//! recoverable by design: the loop logs them, updates link health, and lets
//! the fail-safe logic react. Only configuration errors abort startup.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level daemon error
// ---------------------------------------------------------------------------

/// Every fallible operation in the daemon funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// A sensor notification could not be decoded.
    Decode(DecodeError),
    /// Sensor or actuator I/O failed.
    Link(LinkError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Decode errors
// ---------------------------------------------------------------------------

/// Malformed CSC Measurement notification. The offending notification is
/// discarded; counter state is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is empty (not even a flags byte).
    Empty,
    /// Flags advertise crank data but the payload is shorter than the
    /// advertised layout.
    Truncated { expected: usize, actual: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty notification payload"),
            Self::Truncated { expected, actual } => {
                write!(f, "truncated payload: need {expected} bytes, got {actual}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

/// Sensor-link or actuator-link I/O failure. Recoverable: surfaces as
/// unhealthy link state and a reconnect/retry.
#[derive(Debug)]
pub enum LinkError {
    /// No matching sensor was found within the scan window.
    SensorNotFound,
    /// Connecting or subscribing to the sensor failed.
    SensorConnect(String),
    /// The sensor link dropped while receiving notifications.
    SensorLost,
    /// Authenticating against the access controller failed.
    ActuatorAuth(String),
    /// The configured firewall rule does not exist on the controller.
    RuleNotFound(String),
    /// An actuator HTTP request failed (transport or non-2xx status).
    ActuatorRequest(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorNotFound => write!(f, "no matching cadence sensor found"),
            Self::SensorConnect(msg) => write!(f, "sensor connect failed: {msg}"),
            Self::SensorLost => write!(f, "sensor link lost"),
            Self::ActuatorAuth(msg) => write!(f, "controller login failed: {msg}"),
            Self::RuleNotFound(name) => write!(f, "firewall rule '{name}' not found"),
            Self::ActuatorRequest(msg) => write!(f, "controller request failed: {msg}"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Fatal at startup: the daemon must not run with an undefined configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required setting is absent.
    Missing(&'static str),
    /// A setting failed range or consistency validation.
    Invalid(&'static str),
    /// The config file could not be read.
    Io(String),
    /// The config file could not be parsed.
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "{key} is required"),
            Self::Invalid(msg) => write!(f, "validation failed: {msg}"),
            Self::Io(msg) => write!(f, "config file read failed: {msg}"),
            Self::Parse(msg) => write!(f, "config file parse failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Daemon-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
