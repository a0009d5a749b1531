use crate::constants::ACCEPT_POLL_MS;
use crate::distributor::Distributor;
use crate::error::Result;
use crate::message::MessageFormat;
use crate::subscriber::Subscriber;
use crate::time::sleep_ms;
use crate::transport::TcpTransport;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Accepts stream clients and turns each connection into a [`Subscriber`].
pub struct StreamServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StreamServer {
    /// Binds `address` and accepts clients until `running` is cleared.
    pub fn bind<A: ToSocketAddrs>(
        address: A,
        distributor: Arc<Distributor>,
        cadence: Duration,
        format: MessageFormat,
        running: Arc<AtomicBool>,
    ) -> Result<StreamServer> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let listener_state = Listener {
            distributor,
            cadence,
            format,
            subscribers: Vec::new(),
        };
        let accept_running = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("stream-listener".to_string())
            .spawn(move || listener_state.run(listener, &accept_running))?;

        log::info!("Stream listener on {} (cadence {:?})", local_addr, cadence);
        Ok(StreamServer {
            local_addr,
            running,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Clears the shutdown flag, then unregisters every connected subscriber.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Stream listener thread panicked");
            }
        }
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Listener {
    distributor: Arc<Distributor>,
    cadence: Duration,
    format: MessageFormat,
    subscribers: Vec<Subscriber>,
}

impl Listener {
    fn run(mut self, listener: TcpListener, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = self.subscribe(stream) {
                        log::error!("Failed to subscribe {}: {}", peer, e);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => sleep_ms(ACCEPT_POLL_MS),
                Err(e) => {
                    log::error!("Stream accept failed: {}", e);
                    sleep_ms(ACCEPT_POLL_MS);
                }
            }
            // Subscribers whose peer went away have already unregistered.
            self.subscribers.retain(Subscriber::is_active);
        }

        let count = self.subscribers.len();
        self.subscribers.clear();
        log::info!("Stream listener stopped, dropped {} subscriber(s)", count);
    }

    fn subscribe(&mut self, stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;
        let write_timeout = self.cadence.max(Duration::from_millis(ACCEPT_POLL_MS));
        let transport = TcpTransport::new(stream, Some(write_timeout))?;
        let peer = transport.peer();
        let subscriber = Subscriber::spawn(
            Arc::clone(&self.distributor),
            transport,
            self.cadence,
            self.format.clone(),
        )?;
        log::info!("Stream client {} is subscriber {}", peer, subscriber.id());
        self.subscribers.push(subscriber);
        Ok(())
    }
}
