use crate::constants::{MAX_MOTOR_SPEED_HZ, SAMPLE_RATES_HZ};
use crate::error::{Result, ScanError, SweepError};
use std::time::Duration;
use sweep_data::Scan;

/// Capability over one opened physical device.
///
/// The device is a serial hardware resource: implementations are driven by a
/// single owner at a time and never see concurrent calls.
pub trait SensorHandle: Send + 'static {
    fn start_scanning(&mut self) -> Result<()>;

    fn stop_scanning(&mut self) -> Result<()>;

    /// Blocks until one full revolution is available or `timeout` elapses.
    fn request_scan(&mut self, timeout: Option<Duration>) -> std::result::Result<Scan, ScanError>;

    fn motor_speed(&mut self) -> Result<u32>;

    fn set_motor_speed(&mut self, hz: u32) -> Result<()>;

    fn sample_rate(&mut self) -> Result<u32>;

    fn set_sample_rate(&mut self, hz: u32) -> Result<()>;

    /// Whether the motor has finished calibrating and its speed is stable.
    fn motor_ready(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn reset(&mut self) -> Result<()>;
}

pub(crate) fn check_motor_speed(hz: u32) -> Result<()> {
    if hz > MAX_MOTOR_SPEED_HZ {
        return Err(SweepError::Range {
            name: "motor speed",
            value: hz,
            expected: "Expected 0..=10 Hz.",
        });
    }
    Ok(())
}

pub(crate) fn check_sample_rate(hz: u32) -> Result<()> {
    if !SAMPLE_RATES_HZ.contains(&hz) {
        return Err(SweepError::Range {
            name: "sample rate",
            value: hz,
            expected: "Expected 500, 750 or 1000 Hz.",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_motor_speed() {
        assert!(check_motor_speed(0).is_ok());
        assert!(check_motor_speed(10).is_ok());
        assert!(matches!(
            check_motor_speed(11),
            Err(SweepError::Range { value: 11, .. })
        ));
    }

    #[test]
    fn test_check_sample_rate() {
        for hz in [500, 750, 1000] {
            assert!(check_sample_rate(hz).is_ok());
        }
        assert!(matches!(
            check_sample_rate(600),
            Err(SweepError::Range { value: 600, .. })
        ));
    }
}
