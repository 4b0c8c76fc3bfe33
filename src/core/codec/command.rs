//! Outgoing command encoding

use super::FIELD_SEPARATOR;
use std::fmt;

/// Command sent to the instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Measure a device: `TEST:<device_id>[:<param>]*`
    Test {
        /// Device under test
        device_id: String,
        /// Free-form parameters, sent in order
        params: Vec<String>,
    },
    /// Start instrument calibration: `CALIBRATE`
    Calibrate,
}

impl Command {
    /// Build a test command
    pub fn test<S: AsRef<str>>(device_id: &str, params: &[S]) -> Self {
        Self::Test {
            device_id: device_id.to_string(),
            params: params.iter().map(|p| p.as_ref().to_string()).collect(),
        }
    }

    /// Encode to the wire line, without terminator
    pub fn encode(&self) -> String {
        match self {
            Self::Test { device_id, params } => {
                let mut line = String::from("TEST");
                line.push(FIELD_SEPARATOR);
                line.push_str(device_id);
                for param in params {
                    line.push(FIELD_SEPARATOR);
                    line.push_str(param);
                }
                line
            }
            Self::Calibrate => "CALIBRATE".to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
