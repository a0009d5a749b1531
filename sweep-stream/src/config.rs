use crate::constants::{
    DEFAULT_CADENCE_MS, DEFAULT_CONTROL_ADDRESS, DEFAULT_MOTOR_READY_TIMEOUT_MS,
    DEFAULT_REVOLUTION_MS, DEFAULT_SCAN_TIMEOUT_MS, DEFAULT_STREAM_ADDRESS, MIN_CADENCE_MS,
};
use crate::error::Result;
use crate::message::{GeoReference, MessageFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration loaded from a TOML file. Every field has a default, so an
/// empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SweepConfig {
    pub device: DeviceConfig,
    pub acquisition: AcquisitionConfig,
    pub stream: StreamConfig,
    pub control: ControlConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial port of the device. `None` lets the backend choose.
    pub port: Option<String>,
    /// Revolution period of the simulated device.
    pub revolution_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            port: None,
            revolution_ms: DEFAULT_REVOLUTION_MS,
        }
    }
}

impl DeviceConfig {
    pub fn revolution(&self) -> Duration {
        Duration::from_millis(self.revolution_ms)
    }
}

/// How configuration calls behave while a revolution is being read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigPolicy {
    /// Fail with `DeviceBusy`.
    #[default]
    Reject,
    /// Block until the revolution completes.
    WaitForCycle,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Start scanning as soon as the pipeline runs.
    pub autostart: bool,
    /// Upper bound for one revolution. `None` waits indefinitely.
    pub scan_timeout_ms: Option<u64>,
    pub motor_ready_timeout_ms: u64,
    pub config_policy: ConfigPolicy,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        AcquisitionConfig {
            autostart: true,
            scan_timeout_ms: Some(DEFAULT_SCAN_TIMEOUT_MS),
            motor_ready_timeout_ms: DEFAULT_MOTOR_READY_TIMEOUT_MS,
            config_policy: ConfigPolicy::Reject,
        }
    }
}

impl AcquisitionConfig {
    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_ms.map(Duration::from_millis)
    }

    pub fn motor_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.motor_ready_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// TCP bind address for subscribers.
    pub bind_address: String,
    /// Delivery interval of every subscriber.
    pub cadence_ms: u64,
    pub include_signal: bool,
    pub reference: Option<GeoReference>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            bind_address: DEFAULT_STREAM_ADDRESS.to_string(),
            cadence_ms: DEFAULT_CADENCE_MS,
            include_signal: false,
            reference: None,
        }
    }
}

impl StreamConfig {
    /// Never shorter than one millisecond; a zero interval would spin.
    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms.max(MIN_CADENCE_MS))
    }

    pub fn format(&self) -> MessageFormat {
        MessageFormat {
            include_signal: self.include_signal,
            reference: self.reference,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// TCP bind address for control commands. `None` disables the listener.
    pub bind_address: Option<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            bind_address: Some(DEFAULT_CONTROL_ADDRESS.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl SweepConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
