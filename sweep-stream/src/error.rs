use std::io;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, SweepError>;

/// Errors surfaced synchronously to callers of the device and config API.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("Failed to open device \"{port}\": {reason}")]
    DeviceOpen { port: String, reason: String },

    #[error("{name} = {value} is out of range. {expected}")]
    Range {
        name: &'static str,
        value: u32,
        expected: &'static str,
    },

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Device is busy with an in-flight scan request. Retry after the current revolution.")]
    DeviceBusy,

    #[error("Timed out waiting for motor to stabilize after {0:?}")]
    MotorNotReady(Duration),

    #[error("Device error: {0}")]
    Device(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for SweepError {
    fn from(err: toml::de::Error) -> Self {
        SweepError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SweepError {
    fn from(err: toml::ser::Error) -> Self {
        SweepError::Config(err.to_string())
    }
}

/// Failure of a single acquisition cycle. Recoverable: the loop keeps going.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ScanError {
    #[error("No scan completed within {0:?}")]
    Timeout(Duration),

    #[error("Scan requested while the device is not scanning")]
    NotScanning,

    #[error("Device returned a scan without samples")]
    EmptyScan,

    #[error("Device error during scan: {0}")]
    Device(String),
}

/// Failure of a transport sink to deliver one batch.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Connection closed")]
    Closed,

    #[error("Send failed: {0}")]
    Io(#[from] io::Error),
}

impl SendError {
    /// Maps write errors that mean the peer is gone to `Closed`.
    pub fn from_write(err: io::Error) -> SendError {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => SendError::Closed,
            _ => SendError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_from_write() {
        let e = SendError::from_write(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(e, SendError::Closed));
        let e = SendError::from_write(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(e, SendError::Closed));
        let e = SendError::from_write(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(matches!(e, SendError::Io(_)));
    }

    #[test]
    fn test_range_message() {
        let e = SweepError::Range {
            name: "motor speed",
            value: 11,
            expected: "Expected 0..=10 Hz.",
        };
        assert_eq!(
            e.to_string(),
            "motor speed = 11 is out of range. Expected 0..=10 Hz."
        );
    }
}
