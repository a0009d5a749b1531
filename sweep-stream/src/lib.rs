mod acquisition;
mod config;
mod constants;
mod control;
mod distributor;
mod dummy;
mod error;
mod handle;
mod message;
mod numeric;
mod server;
mod subscriber;
mod time;
mod transport;

pub use crate::acquisition::AcquisitionLoop;
pub use crate::config::{
    AcquisitionConfig, ConfigPolicy, ControlConfig, DeviceConfig, LoggingConfig, StreamConfig,
    SweepConfig,
};
pub use crate::control::{execute, handle_line, ControlCommand, ControlResponse, ControlServer};
pub use crate::distributor::{Distributor, Published, Registration, SubscriberId};
pub use crate::dummy::DummyDevice;
pub use crate::error::{Result, ScanError, SendError, SweepError};
pub use crate::handle::SensorHandle;
pub use crate::message::{GeoReference, MessageFormat};
pub use crate::server::StreamServer;
pub use crate::subscriber::{Subscriber, SubscriberState};
pub use crate::transport::{TcpTransport, Transport};
pub use sweep_data::{DeviceState, Sample, Scan, ScanSequence};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A running acquisition loop with its stream and control listeners.
///
/// Dropping the pipeline stops the listeners, unregisters every subscriber
/// and stops scanning.
pub struct Pipeline<H: SensorHandle> {
    acquisition: Arc<AcquisitionLoop<H>>,
    distributor: Arc<Distributor>,
    format: MessageFormat,
    stream: StreamServer,
    control: Option<ControlServer>,
    running: Arc<AtomicBool>,
}

impl<H: SensorHandle> Pipeline<H> {
    pub fn acquisition(&self) -> &AcquisitionLoop<H> {
        &self.acquisition
    }

    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }

    pub fn stream_addr(&self) -> SocketAddr {
        self.stream.local_addr()
    }

    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control.as_ref().map(ControlServer::local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Attaches an in-process consumer with its own cadence.
    pub fn subscribe<T: Transport>(&self, transport: T, cadence: Duration) -> Result<Subscriber> {
        Subscriber::spawn(
            Arc::clone(&self.distributor),
            transport,
            cadence,
            self.format.clone(),
        )
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.stream.shutdown();
        if let Some(control) = self.control.as_mut() {
            control.shutdown();
        }
        if let Err(e) = self.acquisition.stop() {
            log::error!("Failed to stop acquisition: {}", e);
        }
    }
}

impl<H: SensorHandle> Drop for Pipeline<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Function to launch the pipeline.
/// # Arguments
///
/// * `handle` - Opened device. The pipeline becomes its sole owner.
/// * `config` - Acquisition, stream and control settings.
pub fn run_pipeline<H: SensorHandle>(handle: H, config: &SweepConfig) -> Result<Pipeline<H>> {
    let distributor = Arc::new(Distributor::new());
    let acquisition = Arc::new(AcquisitionLoop::new(
        handle,
        Arc::clone(&distributor),
        config.acquisition.clone(),
    )?);
    let running = Arc::new(AtomicBool::new(true));

    let format = config.stream.format();
    let stream = StreamServer::bind(
        config.stream.bind_address.as_str(),
        Arc::clone(&distributor),
        config.stream.cadence(),
        format.clone(),
        Arc::clone(&running),
    )?;
    let control = match config.control.bind_address.as_deref() {
        Some(address) => Some(ControlServer::bind(
            address,
            Arc::clone(&acquisition),
            Arc::clone(&running),
        )?),
        None => None,
    };

    if config.acquisition.autostart {
        acquisition.start()?;
    }

    Ok(Pipeline {
        acquisition,
        distributor,
        format,
        stream,
        control,
        running,
    })
}
