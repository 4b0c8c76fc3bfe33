//! Simulated instrument transport
//!
//! Answers commands in-process so the controller can run without hardware.
//! Replies come from scripted prefix rules first, then from a simple device
//! model that produces noisy voltage readings and always calibrates.

use super::{Transport, TransportError, TransportStats, TransportType};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared record of every command a simulated transport accepted
pub type SentCommands = Arc<Mutex<Vec<String>>>;

/// Device model behind [`SimulatedTransport`]
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    /// Center of the simulated reading
    pub nominal: f64,
    /// Readings are drawn uniformly from `nominal ± jitter`
    pub jitter: f64,
    /// A reading passes when `|value - nominal| < pass_window`
    pub pass_window: f64,
    /// Unit label sent with each reading
    pub units: String,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self {
            nominal: 5.0,
            jitter: 0.1,
            pass_window: 0.2,
            units: "V".to_string(),
        }
    }
}

impl SimulatedDevice {
    /// Reply the device model gives to a command line
    pub fn respond(&self, command: &str) -> String {
        if command.starts_with("TEST:") {
            let value = if self.jitter > 0.0 {
                self.nominal + rand::thread_rng().gen_range(-self.jitter..=self.jitter)
            } else {
                self.nominal
            };
            let verdict = if (value - self.nominal).abs() < self.pass_window {
                "PASS"
            } else {
                "FAIL"
            };
            format!("RESULT:{:.4}:{}:{}", value, self.units, verdict)
        } else if command == "CALIBRATE" {
            "CAL_OK".to_string()
        } else {
            "ERR:UNKNOWN_COMMAND".to_string()
        }
    }
}

#[derive(Debug, Clone)]
struct ResponseRule {
    prefix: String,
    reply: Option<String>,
}

/// Simulated transport
pub struct SimulatedTransport {
    connected: bool,
    port_name: String,
    baud_rate: u32,
    device: SimulatedDevice,
    rules: Vec<ResponseRule>,
    silent: bool,
    refuse_connect: bool,
    replies: VecDeque<String>,
    sent: SentCommands,
    stats: TransportStats,
    connected_at: Option<Instant>,
}

impl SimulatedTransport {
    /// Create a simulated transport with the default device model
    pub fn new() -> Self {
        Self {
            connected: false,
            port_name: String::new(),
            baud_rate: 0,
            device: SimulatedDevice::default(),
            rules: Vec::new(),
            silent: false,
            refuse_connect: false,
            replies: VecDeque::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
            stats: TransportStats::default(),
            connected_at: None,
        }
    }

    /// Transport that accepts commands but never replies
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::new()
        }
    }

    /// Replace the device model
    #[must_use]
    pub fn with_device(mut self, device: SimulatedDevice) -> Self {
        self.device = device;
        self
    }

    /// Reply with `reply` to any command starting with `prefix`.
    /// Rules are checked in insertion order before the device model.
    #[must_use]
    pub fn with_rule(mut self, prefix: &str, reply: &str) -> Self {
        self.rules.push(ResponseRule {
            prefix: prefix.to_string(),
            reply: Some(reply.to_string()),
        });
        self
    }

    /// Never reply to commands starting with `prefix`
    #[must_use]
    pub fn with_no_reply(mut self, prefix: &str) -> Self {
        self.rules.push(ResponseRule {
            prefix: prefix.to_string(),
            reply: None,
        });
        self
    }

    /// Make every `connect` fail, as an absent port would
    #[must_use]
    pub fn refusing_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Handle to the commands accepted so far; stays valid after the
    /// transport is boxed and handed to a controller
    pub fn sent_commands(&self) -> SentCommands {
        Arc::clone(&self.sent)
    }

    fn reply_for(&self, command: &str) -> Option<String> {
        if self.silent {
            return None;
        }
        match self.rules.iter().find(|r| command.starts_with(&r.prefix)) {
            Some(rule) => rule.reply.clone(),
            None => Some(self.device.respond(command)),
        }
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimulatedTransport {
    fn connect(&mut self, port: &str, baud_rate: u32) -> Result<(), TransportError> {
        if self.refuse_connect {
            return Err(TransportError::PortNotFound(port.to_string()));
        }
        self.connected = true;
        self.port_name = port.to_string();
        self.baud_rate = baud_rate;
        self.replies.clear();
        self.stats = TransportStats::default();
        self.connected_at = Some(Instant::now());
        tracing::debug!("Simulated instrument attached on {}", port);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        self.replies.clear();
        self.connected_at = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_command(&mut self, command: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        self.sent.lock().push(command.to_string());
        self.stats.commands_sent += 1;
        self.stats.bytes_sent += command.len() as u64 + 2;

        if let Some(reply) = self.reply_for(command) {
            self.replies.push_back(reply);
        }
        Ok(())
    }

    fn receive_response(&mut self, timeout: Duration) -> Result<String, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        match self.replies.pop_front() {
            Some(reply) => {
                self.stats.responses_received += 1;
                self.stats.bytes_received += reply.len() as u64 + 2;
                Ok(reply.trim_end().to_string())
            }
            None => {
                self.stats.timeouts += 1;
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Simulated
    }

    fn connection_info(&self) -> String {
        if self.connected {
            format!("{} @ {} baud (simulated)", self.port_name, self.baud_rate)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::TestResponse;

    fn connected(transport: SimulatedTransport) -> SimulatedTransport {
        let mut transport = transport;
        transport.connect("SIM0", 115200).unwrap();
        transport
    }

    #[test]
    fn test_default_device_answers_tests() {
        let mut t = connected(SimulatedTransport::new());
        t.send_command("TEST:DUT:voltage").unwrap();

        let reply = t.receive_response(Duration::from_secs(1)).unwrap();
        let decoded = TestResponse::decode(&reply).unwrap();
        assert!((decoded.value - 5.0).abs() <= 0.1 + 1e-9);
        assert_eq!(decoded.units, "V");
        assert!(decoded.passed);
    }

    #[test]
    fn test_default_device_calibrates() {
        let mut t = connected(SimulatedTransport::new());
        t.send_command("CALIBRATE").unwrap();
        assert_eq!(t.receive_response(Duration::from_secs(1)).unwrap(), "CAL_OK");
    }

    #[test]
    fn test_rules_take_precedence() {
        let mut t = connected(
            SimulatedTransport::new()
                .with_rule("TEST:bad", "GARBAGE")
                .with_no_reply("CALIBRATE"),
        );

        t.send_command("TEST:bad_device").unwrap();
        assert_eq!(t.receive_response(Duration::from_secs(1)).unwrap(), "GARBAGE");

        t.send_command("CALIBRATE").unwrap();
        assert!(matches!(
            t.receive_response(Duration::from_secs(1)),
            Err(TransportError::Timeout(_))
        ));
    }

    #[test]
    fn test_silent_and_refusing() {
        let mut t = connected(SimulatedTransport::silent());
        t.send_command("TEST:X").unwrap();
        assert!(t.receive_response(Duration::from_millis(5)).is_err());
        assert_eq!(t.stats().timeouts, 1);

        let mut refusing = SimulatedTransport::new().refusing_connect();
        assert!(refusing.connect("SIM0", 9600).is_err());
        assert!(!refusing.is_connected());
    }

    #[test]
    fn test_sent_commands_are_recorded() {
        let mut t = connected(SimulatedTransport::new());
        let log = t.sent_commands();
        t.send_command("TEST:A").unwrap();
        t.send_command("CALIBRATE").unwrap();
        assert_eq!(*log.lock(), vec!["TEST:A".to_string(), "CALIBRATE".to_string()]);
    }

    #[test]
    fn test_fixed_reading_fails_outside_window() {
        let device = SimulatedDevice {
            nominal: 5.0,
            jitter: 0.0,
            pass_window: 0.0,
            units: "V".into(),
        };
        assert_eq!(device.respond("TEST:X"), "RESULT:5.0000:V:FAIL");
        assert_eq!(device.respond("HELLO"), "ERR:UNKNOWN_COMMAND");
    }
}
