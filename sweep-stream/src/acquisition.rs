use crate::config::{AcquisitionConfig, ConfigPolicy};
use crate::constants::MOTOR_READY_POLL_MS;
use crate::distributor::{Distributor, Published};
use crate::error::{Result, ScanError, SweepError};
use crate::handle::SensorHandle;
use crate::time::sleep_ms;
use crossbeam_channel::{bounded, Receiver, Sender};
use crossbeam_utils::atomic::AtomicCell;
use crossbeam_utils::Backoff;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use sweep_data::device_state::DEFAULT_MOTOR_SPEED_HZ;
use sweep_data::{DeviceState, ScanSequence};

// Pause after a failed cycle so a dead device does not spin the loop.
const ERROR_PAUSE: Duration = Duration::from_millis(10);
const CONFIG_YIELD: Duration = Duration::from_millis(100);

struct Worker {
    terminator_tx: Sender<bool>,
    thread: JoinHandle<()>,
}

/// State shared with the acquisition thread.
struct Shared<H: SensorHandle> {
    handle: Mutex<H>,
    // Configuration calls waiting for the in-flight revolution.
    pending_config: AtomicUsize,
    // Last assigned sequence number; survives stop/start.
    sequence: AtomicU64,
}

impl<H: SensorHandle> Shared<H> {
    fn lock(&self) -> MutexGuard<'_, H> {
        self.handle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Sole owner of the device. Requests one revolution at a time and hands
/// every completed cycle to the distributor.
pub struct AcquisitionLoop<H: SensorHandle> {
    shared: Arc<Shared<H>>,
    state: AtomicCell<DeviceState>,
    distributor: Arc<Distributor>,
    config: AcquisitionConfig,
    worker: Mutex<Option<Worker>>,
}

impl<H: SensorHandle> AcquisitionLoop<H> {
    pub fn new(
        mut handle: H,
        distributor: Arc<Distributor>,
        config: AcquisitionConfig,
    ) -> Result<AcquisitionLoop<H>> {
        let state = DeviceState {
            scanning: false,
            motor_speed_hz: handle.motor_speed()?,
            sample_rate_hz: handle.sample_rate()?,
        };
        Ok(AcquisitionLoop {
            shared: Arc::new(Shared {
                handle: Mutex::new(handle),
                pending_config: AtomicUsize::new(0),
                sequence: AtomicU64::new(0),
            }),
            state: AtomicCell::new(state),
            distributor,
            config,
            worker: Mutex::new(None),
        })
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the device state. Never blocks on the device.
    pub fn state(&self) -> DeviceState {
        self.state.load()
    }

    pub fn is_scanning(&self) -> bool {
        self.state().scanning
    }

    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }

    /// Last sequence number handed out, scan or error.
    pub fn last_seq(&self) -> Option<ScanSequence> {
        match self.shared.sequence.load(Ordering::Acquire) {
            0 => None,
            seq => Some(seq),
        }
    }

    /// Starts scanning and the acquisition thread. No-op if already scanning.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker();
        if worker.is_some() {
            return Ok(());
        }

        {
            let mut handle = self.shared.lock();
            let mut motor_speed = handle.motor_speed()?;
            if motor_speed == 0 {
                log::info!("Motor is stationary, setting it to {} Hz", DEFAULT_MOTOR_SPEED_HZ);
                handle.set_motor_speed(DEFAULT_MOTOR_SPEED_HZ)?;
                motor_speed = DEFAULT_MOTOR_SPEED_HZ;
                self.state.store(DeviceState {
                    motor_speed_hz: motor_speed,
                    ..self.state.load()
                });
            }
            wait_until_motor_ready(&mut *handle, self.config.motor_ready_timeout())?;
            handle.start_scanning()?;
            self.state.store(DeviceState {
                scanning: true,
                motor_speed_hz: motor_speed,
                ..self.state.load()
            });
        }

        let (terminator_tx, terminator_rx) = bounded(1);
        let shared = Arc::clone(&self.shared);
        let distributor = Arc::clone(&self.distributor);
        let timeout = self.config.scan_timeout();
        let spawned = std::thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || acquire(&shared, &distributor, timeout, terminator_rx));
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.halt_device()?;
                return Err(e.into());
            }
        };

        *worker = Some(Worker {
            terminator_tx,
            thread,
        });
        log::info!("Acquisition started");
        Ok(())
    }

    /// Stops after the in-flight revolution completes. No-op if stopped.
    pub fn stop(&self) -> Result<()> {
        let mut worker = self.worker();
        let Some(Worker {
            terminator_tx,
            thread,
        }) = worker.take()
        else {
            return Ok(());
        };

        let _ = terminator_tx.send(true);
        if thread.join().is_err() {
            log::error!("Acquisition thread panicked");
        }
        self.halt_device()?;
        log::info!("Acquisition stopped");
        Ok(())
    }

    fn halt_device(&self) -> Result<()> {
        let mut handle = self.shared.lock();
        self.state.store(DeviceState {
            scanning: false,
            ..self.state.load()
        });
        handle.stop_scanning()
    }

    /// Re-initializes the device. Only valid while stopped.
    pub fn reset(&self) -> Result<()> {
        let worker = self.worker();
        if worker.is_some() {
            return Err(SweepError::InvalidState(
                "reset requires scanning to be stopped",
            ));
        }
        let mut handle = self.shared.lock();
        handle.reset()?;
        self.state.store(DeviceState::default());
        log::info!("Device reset");
        Ok(())
    }

    pub fn motor_speed(&self) -> Result<u32> {
        match self.try_configure(|handle| handle.motor_speed()) {
            Ok(hz) => {
                self.state.store(DeviceState {
                    motor_speed_hz: hz,
                    ..self.state.load()
                });
                Ok(hz)
            }
            Err(SweepError::DeviceBusy) => Ok(self.state().motor_speed_hz),
            Err(e) => Err(e),
        }
    }

    pub fn set_motor_speed(&self, hz: u32) -> Result<()> {
        self.try_configure(|handle| handle.set_motor_speed(hz))?;
        self.state.store(DeviceState {
            motor_speed_hz: hz,
            ..self.state.load()
        });
        Ok(())
    }

    pub fn sample_rate(&self) -> Result<u32> {
        match self.try_configure(|handle| handle.sample_rate()) {
            Ok(hz) => {
                self.state.store(DeviceState {
                    sample_rate_hz: hz,
                    ..self.state.load()
                });
                Ok(hz)
            }
            Err(SweepError::DeviceBusy) => Ok(self.state().sample_rate_hz),
            Err(e) => Err(e),
        }
    }

    pub fn set_sample_rate(&self, hz: u32) -> Result<()> {
        self.try_configure(|handle| handle.set_sample_rate(hz))?;
        self.state.store(DeviceState {
            sample_rate_hz: hz,
            ..self.state.load()
        });
        Ok(())
    }

    /// Runs `op` against the device between revolutions, never during one.
    fn try_configure<T>(&self, op: impl FnOnce(&mut H) -> Result<T>) -> Result<T> {
        let mut handle = match self.config.config_policy {
            ConfigPolicy::Reject => match self.shared.handle.try_lock() {
                Ok(handle) => handle,
                Err(TryLockError::Poisoned(e)) => e.into_inner(),
                Err(TryLockError::WouldBlock) => return Err(SweepError::DeviceBusy),
            },
            ConfigPolicy::WaitForCycle => {
                self.shared.pending_config.fetch_add(1, Ordering::AcqRel);
                let handle = self.shared.lock();
                self.shared.pending_config.fetch_sub(1, Ordering::AcqRel);
                handle
            }
        };
        op(&mut handle)
    }
}

impl<H: SensorHandle> Drop for AcquisitionLoop<H> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Failed to stop acquisition: {}", e);
        }
    }
}

fn wait_until_motor_ready<H: SensorHandle>(handle: &mut H, timeout: Duration) -> Result<()> {
    let trials = (timeout.as_millis() as u64 / MOTOR_READY_POLL_MS).max(1);
    for trial in 0..trials {
        if trial > 0 {
            sleep_ms(MOTOR_READY_POLL_MS);
        }
        if handle.motor_ready()? {
            return Ok(());
        }
    }
    Err(SweepError::MotorNotReady(timeout))
}

fn do_terminate(terminator_rx: &Receiver<bool>) -> bool {
    terminator_rx.try_recv().unwrap_or(false)
}

fn acquire<H: SensorHandle>(
    shared: &Shared<H>,
    distributor: &Distributor,
    timeout: Option<Duration>,
    terminator_rx: Receiver<bool>,
) {
    while !do_terminate(&terminator_rx) {
        let result = shared.lock().request_scan(timeout);
        let seq = shared.sequence.fetch_add(1, Ordering::AcqRel) + 1;

        let item = match result {
            Ok(scan) if !scan.is_empty() => Published::Scan {
                seq,
                scan: Arc::new(scan),
            },
            Ok(_) => Published::Error {
                seq,
                error: ScanError::EmptyScan,
            },
            Err(error) => Published::Error { seq, error },
        };

        match &item {
            Published::Scan { scan, .. } => {
                log::trace!("Scan #{} with {} samples", seq, scan.len())
            }
            Published::Error { error, .. } => log::warn!("Scan #{} failed: {}", seq, error),
        }
        let failed = matches!(item, Published::Error { .. });
        distributor.publish(item);

        if failed && terminator_rx.recv_timeout(ERROR_PAUSE).unwrap_or(false) {
            break;
        }
        yield_to_pending_config(shared);
    }
}

// Lets a waiting configuration call take the handle before the next request.
fn yield_to_pending_config<H: SensorHandle>(shared: &Shared<H>) {
    let backoff = Backoff::new();
    let deadline = Instant::now() + CONFIG_YIELD;
    while shared.pending_config.load(Ordering::Acquire) > 0 && Instant::now() < deadline {
        backoff.snooze();
    }
}
