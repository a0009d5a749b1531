use crate::acquisition::AcquisitionLoop;
use crate::constants::{ACCEPT_POLL_MS, CONTROL_READ_TIMEOUT};
use crate::error::Result;
use crate::handle::SensorHandle;
use crate::time::sleep_ms;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

// Longest accepted request line.
const MAX_LINE_BYTES: usize = 4096;

/// One control request, sent as a JSON line such as
/// `{"command": "set_motor_speed", "hz": 7}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    StartScanning,
    StopScanning,
    Reset,
    GetMotorSpeed,
    SetMotorSpeed { hz: u32 },
    GetSampleRate,
    SetSampleRate { hz: u32 },
    Status,
}

/// Reply line: `{"ok": true, "value": 7}` or `{"ok": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    fn success(value: Option<Value>) -> ControlResponse {
        ControlResponse {
            ok: true,
            value,
            error: None,
        }
    }

    fn failure(error: String) -> ControlResponse {
        ControlResponse {
            ok: false,
            value: None,
            error: Some(error),
        }
    }
}

/// Runs one command against the acquisition loop.
pub fn execute<H: SensorHandle>(
    acquisition: &AcquisitionLoop<H>,
    command: ControlCommand,
) -> Result<Option<Value>> {
    match command {
        ControlCommand::StartScanning => acquisition.start().map(|_| None),
        ControlCommand::StopScanning => acquisition.stop().map(|_| None),
        ControlCommand::Reset => acquisition.reset().map(|_| None),
        ControlCommand::GetMotorSpeed => acquisition.motor_speed().map(|hz| Some(json!(hz))),
        ControlCommand::SetMotorSpeed { hz } => acquisition.set_motor_speed(hz).map(|_| None),
        ControlCommand::GetSampleRate => acquisition.sample_rate().map(|hz| Some(json!(hz))),
        ControlCommand::SetSampleRate { hz } => acquisition.set_sample_rate(hz).map(|_| None),
        ControlCommand::Status => {
            let state = acquisition.state();
            Ok(Some(json!({
                "scanning": state.scanning,
                "motor_speed_hz": state.motor_speed_hz,
                "sample_rate_hz": state.sample_rate_hz,
                "last_seq": acquisition.last_seq(),
                "subscribers": acquisition.distributor().subscriber_count()
            })))
        }
    }
}

/// Parses and runs one request line. Never fails: errors become the reply.
pub fn handle_line<H: SensorHandle>(
    acquisition: &AcquisitionLoop<H>,
    line: &str,
) -> ControlResponse {
    let command: ControlCommand = match serde_json::from_str(line) {
        Ok(command) => command,
        Err(e) => return ControlResponse::failure(format!("Invalid command: {}", e)),
    };
    log::debug!("Control command: {:?}", command);
    match execute(acquisition, command) {
        Ok(value) => ControlResponse::success(value),
        Err(e) => {
            log::warn!("Control command {:?} failed: {}", command, e);
            ControlResponse::failure(e.to_string())
        }
    }
}

/// TCP listener answering control requests, one thread per connection.
pub struct ControlServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ControlServer {
    /// Binds `address` and serves until `running` is cleared.
    pub fn bind<A: ToSocketAddrs, H: SensorHandle>(
        address: A,
        acquisition: Arc<AcquisitionLoop<H>>,
        running: Arc<AtomicBool>,
    ) -> Result<ControlServer> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let accept_running = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("control-listener".to_string())
            .spawn(move || accept_loop(listener, acquisition, accept_running))?;

        log::info!("Control listener on {}", local_addr);
        Ok(ControlServer {
            local_addr,
            running,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Clears the shutdown flag and waits for every connection to close.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Control listener thread panicked");
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop<H: SensorHandle>(
    listener: TcpListener,
    acquisition: Arc<AcquisitionLoop<H>>,
    running: Arc<AtomicBool>,
) {
    let mut connections: Vec<JoinHandle<()>> = Vec::new();
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("Control client connected: {}", peer);
                let acquisition = Arc::clone(&acquisition);
                let running = Arc::clone(&running);
                let spawned = std::thread::Builder::new()
                    .name(format!("control-{}", peer))
                    .spawn(move || {
                        if let Err(e) = serve_connection(stream, &acquisition, &running) {
                            log::warn!("Control connection {} failed: {}", peer, e);
                        }
                        log::info!("Control client disconnected: {}", peer);
                    });
                match spawned {
                    Ok(thread) => connections.push(thread),
                    Err(e) => log::error!("Failed to spawn control connection: {}", e),
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => sleep_ms(ACCEPT_POLL_MS),
            Err(e) => {
                log::error!("Control accept failed: {}", e);
                sleep_ms(ACCEPT_POLL_MS);
            }
        }
        connections.retain(|thread| !thread.is_finished());
    }

    for thread in connections {
        let _ = thread.join();
    }
    log::info!("Control listener stopped");
}

fn serve_connection<H: SensorHandle>(
    stream: TcpStream,
    acquisition: &AcquisitionLoop<H>,
    running: &AtomicBool,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CONTROL_READ_TIMEOUT))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    while running.load(Ordering::Relaxed) {
        let limit = (MAX_LINE_BYTES + 1).saturating_sub(line.len()) as u64;
        match reader.by_ref().take(limit).read_until(b'\n', &mut line) {
            Ok(0) => break,
            // End of stream mid-line, or a line longer than MAX_LINE_BYTES.
            Ok(_) if line.last() != Some(&b'\n') => break,
            Ok(_) => {}
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        let request = String::from_utf8_lossy(&line);
        let request = request.trim();
        if !request.is_empty() {
            let response = handle_line(acquisition, request);
            let mut reply = serde_json::to_vec(&response).map_err(std::io::Error::from)?;
            reply.push(b'\n');
            writer.write_all(&reply)?;
        }
        line.clear();
    }

    let _ = writer.shutdown(Shutdown::Both);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcquisitionConfig;
    use crate::distributor::Distributor;
    use crate::dummy::DummyDevice;
    use std::time::Duration;

    fn acquisition() -> AcquisitionLoop<DummyDevice> {
        let device = DummyDevice::open(None)
            .unwrap()
            .with_revolution(Duration::from_millis(5));
        AcquisitionLoop::new(
            device,
            Arc::new(Distributor::new()),
            AcquisitionConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_commands() {
        let command: ControlCommand = serde_json::from_str(r#"{"command":"status"}"#).unwrap();
        assert_eq!(command, ControlCommand::Status);
        let command: ControlCommand =
            serde_json::from_str(r#"{"command":"set_motor_speed","hz":7}"#).unwrap();
        assert_eq!(command, ControlCommand::SetMotorSpeed { hz: 7 });
        assert!(serde_json::from_str::<ControlCommand>(r#"{"command":"set_motor_speed"}"#).is_err());
        assert!(serde_json::from_str::<ControlCommand>(r#"{"command":"launch"}"#).is_err());
    }

    #[test]
    fn test_handle_line() {
        let acquisition = acquisition();

        let response = handle_line(&acquisition, r#"{"command":"set_motor_speed","hz":3}"#);
        assert!(response.ok);
        assert_eq!(response.value, None);

        let response = handle_line(&acquisition, r#"{"command":"get_motor_speed"}"#);
        assert_eq!(response.value, Some(json!(3)));

        let response = handle_line(&acquisition, r#"{"command":"set_motor_speed","hz":11}"#);
        assert!(!response.ok);
        assert!(response.error.unwrap().contains("out of range"));

        let response = handle_line(&acquisition, r#"{"command":"get_sample_rate"}"#);
        assert_eq!(response.value, Some(json!(500)));

        let response = handle_line(&acquisition, "not json");
        assert!(!response.ok);
        assert!(response.error.unwrap().starts_with("Invalid command"));
    }

    #[test]
    fn test_reset_while_scanning_is_rejected() {
        let acquisition = acquisition();
        assert!(handle_line(&acquisition, r#"{"command":"start_scanning"}"#).ok);

        let response = handle_line(&acquisition, r#"{"command":"reset"}"#);
        assert!(!response.ok);
        assert!(response.error.unwrap().contains("Invalid state"));

        assert!(handle_line(&acquisition, r#"{"command":"stop_scanning"}"#).ok);
        assert!(handle_line(&acquisition, r#"{"command":"reset"}"#).ok);
    }

    #[test]
    fn test_status() {
        let acquisition = acquisition();
        let response = handle_line(&acquisition, r#"{"command":"status"}"#);
        assert_eq!(
            response.value,
            Some(json!({
                "scanning": false,
                "motor_speed_hz": 5,
                "sample_rate_hz": 500,
                "last_seq": null,
                "subscribers": 0
            }))
        );
    }

    #[test]
    fn test_response_json() {
        let text = serde_json::to_string(&ControlResponse::success(None)).unwrap();
        assert_eq!(text, r#"{"ok":true}"#);
        let text = serde_json::to_string(&ControlResponse::failure("busy".to_string())).unwrap();
        assert_eq!(text, r#"{"ok":false,"error":"busy"}"#);
    }

    #[test]
    fn test_overlong_line_closes_connection() {
        let acquisition = Arc::new(acquisition());
        let running = Arc::new(AtomicBool::new(true));
        let mut server = ControlServer::bind("127.0.0.1:0", acquisition, running).unwrap();

        let mut stream = TcpStream::connect(server.local_addr()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let _ = stream.write_all(&vec![b'x'; MAX_LINE_BYTES * 4]);

        let mut buf = [0u8; 16];
        match stream.read(&mut buf) {
            Ok(n) => assert_eq!(n, 0),
            Err(e) => assert!(
                e.kind() != ErrorKind::WouldBlock && e.kind() != ErrorKind::TimedOut,
                "connection still open: {}",
                e
            ),
        }
        server.shutdown();
    }

    #[test]
    fn test_control_server_over_tcp() {
        let acquisition = Arc::new(acquisition());
        let running = Arc::new(AtomicBool::new(true));
        let mut server =
            ControlServer::bind("127.0.0.1:0", Arc::clone(&acquisition), running).unwrap();

        let stream = TcpStream::connect(server.local_addr()).unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut lines = BufReader::new(stream).lines();

        writer
            .write_all(b"{\"command\":\"set_sample_rate\",\"hz\":1000}\n")
            .unwrap();
        let reply: ControlResponse =
            serde_json::from_str(&lines.next().unwrap().unwrap()).unwrap();
        assert!(reply.ok);

        writer.write_all(b"{\"command\":\"get_sample_rate\"}\n").unwrap();
        let reply: ControlResponse =
            serde_json::from_str(&lines.next().unwrap().unwrap()).unwrap();
        assert_eq!(reply.value, Some(json!(1000)));

        server.shutdown();
        assert_eq!(acquisition.state().sample_rate_hz, 1000);
    }
}
