#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default motor speed of a freshly opened or reset device.
pub const DEFAULT_MOTOR_SPEED_HZ: u32 = 5;
/// Default sample rate of a freshly opened or reset device.
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceState {
    pub scanning: bool,
    pub motor_speed_hz: u32,
    pub sample_rate_hz: u32,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            scanning: false,
            motor_speed_hz: DEFAULT_MOTOR_SPEED_HZ,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
        }
    }
}
