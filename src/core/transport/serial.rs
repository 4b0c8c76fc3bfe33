//! Serial port transport implementation

use super::{Transport, TransportError, TransportStats, TransportType, POLL_INTERVAL};
use crate::core::codec::LineEnding;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

const READ_CHUNK: usize = 256;

/// How long a stalled write may keep resuming before the send gives up
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Serial port transport.
///
/// Opens the port 8N1 without flow control. The OS handle lives in
/// `port` and is closed whenever that option is cleared, including on drop.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    baud_rate: u32,
    line_ending: LineEnding,
    pending: Vec<u8>,
    write_timeout: Duration,
    stats: TransportStats,
    connected_at: Option<Instant>,
}

impl SerialTransport {
    /// Create a disconnected serial transport
    pub fn new() -> Self {
        Self {
            port: None,
            port_name: String::new(),
            baud_rate: 0,
            line_ending: LineEnding::CrLf,
            pending: Vec::new(),
            write_timeout: WRITE_TIMEOUT,
            stats: TransportStats::default(),
            connected_at: None,
        }
    }

    #[cfg(test)]
    fn attached(port: Box<dyn SerialPort>) -> Self {
        let mut transport = Self::new();
        transport.port = Some(port);
        transport.port_name = "FAKE0".to_string();
        transport.baud_rate = 9600;
        transport.connected_at = Some(Instant::now());
        transport
    }

    /// Set the terminator appended to outgoing commands
    #[must_use]
    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Set how long a stalled write keeps resuming
    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    fn map_open_error(&self, e: serialport::Error) -> TransportError {
        match e.kind() {
            serialport::ErrorKind::NoDevice => TransportError::PortNotFound(self.port_name.clone()),
            serialport::ErrorKind::Io(ErrorKind::NotFound) => {
                TransportError::PortNotFound(self.port_name.clone())
            }
            serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => {
                TransportError::PermissionDenied(self.port_name.clone())
            }
            _ => TransportError::ConnectionFailed(format!("{}: {}", self.port_name, e)),
        }
    }

    /// Pull whatever the driver has buffered into `pending`
    fn poll_port(&mut self) -> Result<usize, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;

        let available = port.bytes_to_read().map_err(std::io::Error::from)? as usize;
        if available == 0 {
            return Ok(0);
        }

        let mut buffer = [0u8; READ_CHUNK];
        let want = available.min(READ_CHUNK);
        match port.read(&mut buffer[..want]) {
            Ok(n) => {
                self.pending.extend_from_slice(&buffer[..n]);
                self.stats.bytes_received += n as u64;
                Ok(n)
            }
            Err(ref e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                self.stats.errors += 1;
                Err(TransportError::Io(e))
            }
        }
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

impl Transport for SerialTransport {
    fn connect(&mut self, port: &str, baud_rate: u32) -> Result<(), TransportError> {
        if self.port.is_some() {
            self.disconnect()?;
        }
        self.port_name = port.to_string();
        self.baud_rate = baud_rate;

        let opened = serialport::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|e| self.map_open_error(e))?;

        if let Err(e) = opened.clear(ClearBuffer::Input) {
            tracing::debug!("Could not flush input buffer on {}: {}", port, e);
        }

        self.port = Some(opened);
        self.pending.clear();
        self.stats = TransportStats::default();
        self.connected_at = Some(Instant::now());

        tracing::info!("Opened {} @ {} baud", port, baud_rate);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.port.take().is_some() {
            tracing::info!("Closed {}", self.port_name);
        }
        self.pending.clear();
        self.connected_at = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn send_command(&mut self, command: &str) -> Result<(), TransportError> {
        let deadline = Instant::now() + self.write_timeout;
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        let data = self.line_ending.terminate(command);

        // Writes time out after POLL_INTERVAL; a short write resumes from
        // where it stopped until the deadline passes
        let mut written = 0;
        let mut failure = None;
        while written < data.len() {
            match port.write(&data[written..]) {
                Ok(0) => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Ok(n) => written += n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(ref e) if e.kind() == ErrorKind::TimedOut => {
                    if Instant::now() >= deadline {
                        break;
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if written > 0 {
            port.flush()?;
        }
        self.stats.bytes_sent += written as u64;

        match failure {
            Some(e) if written == 0 => {
                self.stats.errors += 1;
                return Err(TransportError::Io(e));
            }
            Some(e) => tracing::warn!(
                "Write to {} failed after {} bytes: {}",
                self.port_name,
                written,
                e
            ),
            None => {}
        }
        if written != data.len() {
            self.stats.errors += 1;
            return Err(TransportError::IncompleteWrite {
                written,
                expected: data.len(),
            });
        }

        self.stats.commands_sent += 1;
        tracing::trace!("TX {}", command);
        Ok(())
    }

    fn receive_response(&mut self, timeout: Duration) -> Result<String, TransportError> {
        if self.port.is_none() {
            return Err(TransportError::NotConnected);
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = split_line(&mut self.pending) {
                self.stats.responses_received += 1;
                tracing::trace!("RX {}", line);
                return Ok(line);
            }
            if Instant::now() >= deadline {
                break;
            }
            if self.poll_port()? == 0 {
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        // Unterminated text still counts as the reply
        let partial = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        if !partial.is_empty() {
            self.stats.responses_received += 1;
            tracing::trace!("RX (unterminated) {}", partial);
            return Ok(partial);
        }

        self.stats.timeouts += 1;
        Err(TransportError::Timeout(timeout))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Serial
    }

    fn connection_info(&self) -> String {
        if self.port.is_some() {
            format!("{} @ {} baud (8N1)", self.port_name, self.baud_rate)
        } else {
            "Not connected".to_string()
        }
    }

    fn stats(&self) -> TransportStats {
        let mut stats = self.stats.clone();
        if let Some(connected_at) = self.connected_at {
            stats.uptime_secs = connected_at.elapsed().as_secs();
        }
        stats
    }
}

/// Remove the first non-blank line from `buffer`.
///
/// Lines end at `\n` or `\r`; blank lines (for example the `\n` half of a
/// CRLF split across reads) are dropped. Returns `None` until a terminator
/// has arrived.
pub(crate) fn split_line(buffer: &mut Vec<u8>) -> Option<String> {
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n' || b == b'\r') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line).trim_end().to_string();
        if !text.is_empty() {
            return Some(text);
        }
    }
    None
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::Io(e.into()))
}
