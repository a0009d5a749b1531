use crate::constants::{DUMMY_DISTANCE_CM, DUMMY_SAMPLES_PER_SCAN, DUMMY_SIGNAL};
use crate::error::{Result, ScanError, SweepError};
use crate::handle::{check_motor_speed, check_sample_rate, SensorHandle};
use crate::numeric::{centimeters_to_millimeters, millidegrees_to_degrees, to_signal};
use std::time::Duration;
use sweep_data::device_state::{DEFAULT_MOTOR_SPEED_HZ, DEFAULT_SAMPLE_RATE_HZ};
use sweep_data::{Sample, Scan};

/// Simulated device producing a deterministic pattern.
///
/// Every scan holds four samples per quadrant, shifted by one degree per
/// request so consecutive scans are distinguishable.
pub struct DummyDevice {
    port: String,
    scanning: bool,
    motor_speed: u32,
    sample_rate: u32,
    revolution: Duration,
    samples_per_scan: i32,
    nth_scan_request: i32,
    requests: u64,
    fail_every: Option<u64>,
    settle_polls: u32,
    unsettled_polls: u32,
}

impl DummyDevice {
    /// Opens the simulated device. `None` picks a placeholder port name.
    pub fn open(port: Option<&str>) -> Result<DummyDevice> {
        let port = port.unwrap_or("dummy");
        if port.trim().is_empty() {
            return Err(SweepError::DeviceOpen {
                port: port.to_string(),
                reason: "empty port name".to_string(),
            });
        }
        log::info!("Opened simulated device on \"{}\"", port);
        Ok(DummyDevice {
            port: port.to_string(),
            scanning: false,
            motor_speed: DEFAULT_MOTOR_SPEED_HZ,
            sample_rate: DEFAULT_SAMPLE_RATE_HZ,
            revolution: Duration::from_millis(crate::constants::DEFAULT_REVOLUTION_MS),
            samples_per_scan: DUMMY_SAMPLES_PER_SCAN,
            nth_scan_request: 0,
            requests: 0,
            fail_every: None,
            settle_polls: 0,
            unsettled_polls: 0,
        })
    }

    /// Time one simulated revolution takes.
    pub fn with_revolution(mut self, revolution: Duration) -> Self {
        self.revolution = revolution;
        self
    }

    pub fn with_samples_per_scan(mut self, n: usize) -> Self {
        self.samples_per_scan = n.min(i32::MAX as usize) as i32;
        self
    }

    /// Makes every `n`-th scan request fail.
    pub fn fail_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Number of `motor_ready` polls reporting false after a speed change.
    pub fn with_settle_polls(mut self, polls: u32) -> Self {
        self.settle_polls = polls;
        self
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

fn dummy_sample(index: i32, nth: i32) -> Sample {
    let quadrant = ((index / 4) * 90) % 360;
    let delta = (index % 4) * 2 + nth;
    let millidegrees = ((quadrant + delta) % 360) * 1000;
    Sample::new(
        millidegrees_to_degrees(millidegrees),
        centimeters_to_millimeters(DUMMY_DISTANCE_CM),
        to_signal(DUMMY_SIGNAL),
    )
}

impl SensorHandle for DummyDevice {
    fn start_scanning(&mut self) -> Result<()> {
        if self.motor_speed == 0 {
            return Err(SweepError::Device(
                "Failed to start scanning because motor is stationary.".to_string(),
            ));
        }
        self.scanning = true;
        Ok(())
    }

    fn stop_scanning(&mut self) -> Result<()> {
        self.scanning = false;
        Ok(())
    }

    fn request_scan(&mut self, timeout: Option<Duration>) -> std::result::Result<Scan, ScanError> {
        if !self.scanning {
            return Err(ScanError::NotScanning);
        }
        if let Some(timeout) = timeout {
            if timeout < self.revolution {
                std::thread::sleep(timeout);
                return Err(ScanError::Timeout(timeout));
            }
        }
        std::thread::sleep(self.revolution);

        let nth = self.nth_scan_request;
        self.nth_scan_request = (nth + 1) % 360;
        self.requests += 1;
        if let Some(n) = self.fail_every {
            if self.requests % n == 0 {
                return Err(ScanError::Device(format!(
                    "simulated read failure on request {}",
                    self.requests
                )));
            }
        }

        Ok((0..self.samples_per_scan)
            .map(|index| dummy_sample(index, nth))
            .collect())
    }

    fn motor_speed(&mut self) -> Result<u32> {
        Ok(self.motor_speed)
    }

    fn set_motor_speed(&mut self, hz: u32) -> Result<()> {
        check_motor_speed(hz)?;
        self.motor_speed = hz;
        self.unsettled_polls = self.settle_polls;
        Ok(())
    }

    fn sample_rate(&mut self) -> Result<u32> {
        Ok(self.sample_rate)
    }

    fn set_sample_rate(&mut self, hz: u32) -> Result<()> {
        check_sample_rate(hz)?;
        self.sample_rate = hz;
        Ok(())
    }

    fn motor_ready(&mut self) -> Result<bool> {
        if self.unsettled_polls > 0 {
            self.unsettled_polls -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    fn reset(&mut self) -> Result<()> {
        if self.scanning {
            return Err(SweepError::InvalidState("reset requires scanning to be stopped"));
        }
        self.motor_speed = DEFAULT_MOTOR_SPEED_HZ;
        self.sample_rate = DEFAULT_SAMPLE_RATE_HZ;
        self.nth_scan_request = 0;
        self.unsettled_polls = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_device() -> DummyDevice {
        DummyDevice::open(None)
            .unwrap()
            .with_revolution(Duration::from_millis(1))
    }

    #[test]
    fn test_open() {
        assert_eq!(DummyDevice::open(None).unwrap().port(), "dummy");
        assert_eq!(
            DummyDevice::open(Some("/dev/ttyUSB0")).unwrap().port(),
            "/dev/ttyUSB0"
        );
        assert!(matches!(
            DummyDevice::open(Some(" ")),
            Err(SweepError::DeviceOpen { .. })
        ));
    }

    #[test]
    fn test_request_scan_pattern() {
        let mut device = fast_device();
        device.start_scanning().unwrap();

        let scan = device.request_scan(None).unwrap();
        assert_eq!(scan.len(), 16);
        let angles: Vec<f64> = scan.samples.iter().map(|s| s.angle).collect();
        assert_eq!(
            angles,
            vec![
                0., 2., 4., 6., 90., 92., 94., 96., 180., 182., 184., 186., 270., 272., 274.,
                276.
            ]
        );
        assert!(scan.samples.iter().all(|s| s.distance == 2000));
        assert!(scan.samples.iter().all(|s| s.signal == 200));

        let scan = device.request_scan(None).unwrap();
        assert_eq!(scan.samples[0].angle, 1.);
        assert_eq!(scan.samples[15].angle, 277.);
        assert_eq!(scan.wraparounds(), 0);
    }

    #[test]
    fn test_request_scan_requires_scanning() {
        let mut device = fast_device();
        assert_eq!(device.request_scan(None), Err(ScanError::NotScanning));
        device.start_scanning().unwrap();
        assert!(device.request_scan(None).is_ok());
        device.stop_scanning().unwrap();
        assert_eq!(device.request_scan(None), Err(ScanError::NotScanning));
    }

    #[test]
    fn test_request_scan_timeout() {
        let mut device = DummyDevice::open(None)
            .unwrap()
            .with_revolution(Duration::from_millis(50));
        device.start_scanning().unwrap();
        let timeout = Duration::from_millis(5);
        assert_eq!(
            device.request_scan(Some(timeout)),
            Err(ScanError::Timeout(timeout))
        );
    }

    #[test]
    fn test_fail_every() {
        let mut device = fast_device().fail_every(2);
        device.start_scanning().unwrap();
        assert!(device.request_scan(None).is_ok());
        assert!(matches!(device.request_scan(None), Err(ScanError::Device(_))));
        assert!(device.request_scan(None).is_ok());
    }

    #[test]
    fn test_motor_speed_and_sample_rate() {
        let mut device = fast_device();
        assert_eq!(device.motor_speed().unwrap(), 5);
        assert_eq!(device.sample_rate().unwrap(), 500);

        device.set_motor_speed(8).unwrap();
        assert_eq!(device.motor_speed().unwrap(), 8);
        assert!(matches!(
            device.set_motor_speed(11),
            Err(SweepError::Range { .. })
        ));
        assert_eq!(device.motor_speed().unwrap(), 8);

        device.set_sample_rate(1000).unwrap();
        assert_eq!(device.sample_rate().unwrap(), 1000);
        assert!(device.set_sample_rate(999).is_err());
    }

    #[test]
    fn test_stationary_motor_cannot_start() {
        let mut device = fast_device();
        device.set_motor_speed(0).unwrap();
        assert!(matches!(device.start_scanning(), Err(SweepError::Device(_))));
    }

    #[test]
    fn test_settle_polls() {
        let mut device = fast_device().with_settle_polls(2);
        assert!(device.motor_ready().unwrap());
        device.set_motor_speed(3).unwrap();
        assert!(!device.motor_ready().unwrap());
        assert!(!device.motor_ready().unwrap());
        assert!(device.motor_ready().unwrap());
    }

    #[test]
    fn test_reset() {
        let mut device = fast_device();
        device.set_motor_speed(9).unwrap();
        device.start_scanning().unwrap();
        assert!(matches!(device.reset(), Err(SweepError::InvalidState(_))));
        device.stop_scanning().unwrap();
        device.reset().unwrap();
        assert_eq!(device.motor_speed().unwrap(), 5);
        assert_eq!(device.sample_rate().unwrap(), 500);
    }
}
