//! Transport layer for instrument links
//!
//! A transport moves command lines to the instrument and reads reply lines
//! back. Implementations are selected by a static key through
//! [`create_transport`]:
//! - `"serial"`: RS-232 / USB-serial via the `serialport` crate
//! - `"simulated"`: in-process virtual instrument

mod serial;
mod simulated;

pub use serial::{list_ports, SerialTransport};
pub use simulated::{SimulatedDevice, SimulatedTransport};

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Interval between polls while waiting for a reply
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Serial port
    Serial,
    /// In-process simulated instrument
    Simulated,
}

impl TransportType {
    /// Selection key accepted by [`create_transport`]
    pub fn key(&self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Simulated => "simulated",
        }
    }

    /// Resolve a selection key
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "serial" => Some(Self::Serial),
            "simulated" => Some(Self::Simulated),
            _ => None,
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "Serial"),
            Self::Simulated => write!(f, "Simulated"),
        }
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Opening or configuring the link failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Operation needs an open link
    #[error("Not connected")]
    NotConnected,

    /// No complete reply within the wait bound
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// Only part of the payload reached the link
    #[error("Incomplete write: {written} of {expected} bytes")]
    IncompleteWrite {
        /// Bytes accepted by the link
        written: usize,
        /// Bytes in the payload
        expected: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Check if a failed send left nothing on the wire, so the whole
    /// command line can be sent again
    pub fn is_resendable(&self) -> bool {
        match self {
            Self::NotConnected => false,
            Self::IncompleteWrite { written, .. } => *written == 0,
            _ => true,
        }
    }
}

/// Transport statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Command lines sent
    pub commands_sent: u64,
    /// Reply lines received
    pub responses_received: u64,
    /// Waits that ended without a reply
    pub timeouts: u64,
    /// Errors count
    pub errors: u64,
    /// Connection uptime in seconds
    pub uptime_secs: u64,
}

/// Line-oriented link to an instrument.
///
/// All calls block the calling thread. A transport owns at most one open
/// OS handle; dropping it releases the handle.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Open the link. On failure the transport stays disconnected.
    fn connect(&mut self, port: &str, baud_rate: u32) -> Result<(), TransportError>;

    /// Release the link. Idempotent.
    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Check if the last connect succeeded and no disconnect followed
    fn is_connected(&self) -> bool;

    /// Write one command line, terminator appended, in full
    fn send_command(&mut self, command: &str) -> Result<(), TransportError>;

    /// Wait up to `timeout` for one reply line, returned with trailing
    /// whitespace trimmed
    fn receive_response(&mut self, timeout: Duration) -> Result<String, TransportError>;

    /// Get transport type
    fn transport_type(&self) -> TransportType;

    /// Get connection info string
    fn connection_info(&self) -> String;

    /// Get statistics
    fn stats(&self) -> TransportStats;
}

/// Create a transport by selection key.
///
/// Unknown keys yield `None`, which callers treat as a creation failure.
pub fn create_transport(key: &str) -> Option<Box<dyn Transport>> {
    match TransportType::from_key(key)? {
        TransportType::Serial => Some(Box::new(SerialTransport::new())),
        TransportType::Simulated => Some(Box::new(SimulatedTransport::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_keys() {
        let serial = create_transport("serial").unwrap();
        assert_eq!(serial.transport_type(), TransportType::Serial);
        assert!(!serial.is_connected());

        let sim = create_transport("simulated").unwrap();
        assert_eq!(sim.transport_type(), TransportType::Simulated);
    }

    #[test]
    fn test_factory_unknown_key() {
        assert!(create_transport("ethernet").is_none());
        assert!(create_transport("").is_none());
        assert!(create_transport("Serial").is_none());
    }

    #[test]
    fn test_partial_write_is_not_resendable() {
        let partial = TransportError::IncompleteWrite {
            written: 7,
            expected: 20,
        };
        let nothing = TransportError::IncompleteWrite {
            written: 0,
            expected: 20,
        };
        assert!(!partial.is_resendable());
        assert!(nothing.is_resendable());
        assert!(!TransportError::NotConnected.is_resendable());
        assert!(TransportError::Timeout(POLL_INTERVAL).is_resendable());
    }

    #[test]
    fn test_key_round_trip() {
        for t in [TransportType::Serial, TransportType::Simulated] {
            assert_eq!(TransportType::from_key(t.key()), Some(t));
        }
    }
}
