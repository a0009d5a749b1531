use crate::error::SendError;
use crossbeam_channel::Sender;
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Sink a subscriber pushes one batch of serialized messages into per tick.
pub trait Transport: Send + 'static {
    fn send(&mut self, batch: &[String]) -> Result<(), SendError>;
}

/// Writes every message as one newline-terminated line.
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
    buffer: Vec<u8>,
}

impl TcpTransport {
    /// `write_timeout` bounds how long a stalled client can hold a tick.
    pub fn new(
        stream: TcpStream,
        write_timeout: Option<Duration>,
    ) -> std::io::Result<TcpTransport> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(write_timeout)?;
        Ok(TcpTransport {
            stream,
            peer,
            buffer: Vec::with_capacity(4096),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, batch: &[String]) -> Result<(), SendError> {
        self.buffer.clear();
        for message in batch {
            self.buffer.extend_from_slice(message.as_bytes());
            self.buffer.push(b'\n');
        }
        self.stream
            .write_all(&self.buffer)
            .map_err(SendError::from_write)?;
        self.stream.flush().map_err(SendError::from_write)
    }
}

/// In-process consumers receive batches over a channel.
impl Transport for Sender<Vec<String>> {
    fn send(&mut self, batch: &[String]) -> Result<(), SendError> {
        Sender::send(self, batch.to_vec()).map_err(|_| SendError::Closed)
    }
}
