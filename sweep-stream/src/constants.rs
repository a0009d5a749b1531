use std::time::Duration;

pub(crate) const MAX_MOTOR_SPEED_HZ: u32 = 10;
pub(crate) const SAMPLE_RATES_HZ: [u32; 3] = [500, 750, 1000];
pub(crate) const MOTOR_READY_POLL_MS: u64 = 500;
// Motor adjustments take 7-9 seconds on real hardware
pub(crate) const DEFAULT_MOTOR_READY_TIMEOUT_MS: u64 = 10_000;
pub(crate) const DEFAULT_SCAN_TIMEOUT_MS: u64 = 2_000;
pub(crate) const DEFAULT_CADENCE_MS: u64 = 2_000;
pub(crate) const MIN_CADENCE_MS: u64 = 1;
pub(crate) const DEFAULT_REVOLUTION_MS: u64 = 100;
pub(crate) const DEFAULT_STREAM_ADDRESS: &str = "0.0.0.0:5000";
pub(crate) const DEFAULT_CONTROL_ADDRESS: &str = "0.0.0.0:5001";
// Specific to the simulated device
pub(crate) const DUMMY_SAMPLES_PER_SCAN: i32 = 16;
pub(crate) const DUMMY_DISTANCE_CM: i32 = 200;
pub(crate) const DUMMY_SIGNAL: i32 = 200;
pub(crate) const ACCEPT_POLL_MS: u64 = 10;
pub(crate) const CONTROL_READ_TIMEOUT: Duration = Duration::from_millis(200);
