//! Line protocol codec
//!
//! Commands and responses are ASCII lines:
//! - `TEST:<device_id>[:<param>]*` answered by `RESULT:<value>:<units>:<verdict>`
//! - `CALIBRATE` answered by any text containing `CAL_OK` on success

mod command;
mod response;

pub use command::Command;
pub use response::{
    decode_calibration, is_calibration_ok, TestResponse, CALIBRATION_OK_MARKER, RESULT_TAG,
};

use serde::{Deserialize, Serialize};
use std::num::ParseFloatError;
use std::time::Duration;

/// How long `run_test` waits for a `RESULT` line
pub const TEST_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `calibrate` waits for the calibration reply
pub const CALIBRATION_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Settling delay before the `CALIBRATE` command is sent
pub const CALIBRATION_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Field separator on the wire
pub const FIELD_SEPARATOR: char = ':';

/// Line terminator appended to outgoing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LineEnding {
    /// Carriage Return only
    Cr,
    /// Line Feed only
    Lf,
    /// Both CR and LF
    #[default]
    CrLf,
}

impl LineEnding {
    /// Get the byte sequence for this line ending
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Self::Cr => b"\r",
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
        }
    }

    /// Append this terminator to a command line
    pub fn terminate(&self, line: &str) -> Vec<u8> {
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(self.bytes());
        data
    }
}

/// Response decoding errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    /// Line is not `RESULT:<value>:<units>:<verdict>`
    #[error("Invalid response format: {0}")]
    UnexpectedShape(String),

    /// Measurement field is not a floating-point number
    #[error("Invalid measurement value '{value}' in response: {raw}")]
    InvalidValue {
        /// Offending token
        value: String,
        /// Full response line
        raw: String,
        /// Parser error
        #[source]
        source: ParseFloatError,
    },

    /// Measurement field parsed to NaN or an infinity
    #[error("Measurement value '{value}' is not a finite number in response: {raw}")]
    NonFiniteValue {
        /// Offending token
        value: String,
        /// Full response line
        raw: String,
    },

    /// Calibration reply without the `CAL_OK` marker
    #[error("Calibration not confirmed, instrument replied: {0}")]
    CalibrationRejected(String),
}

impl ProtocolError {
    /// The raw response line that failed to decode
    pub fn raw(&self) -> &str {
        match self {
            Self::UnexpectedShape(raw) => raw,
            Self::InvalidValue { raw, .. } | Self::NonFiniteValue { raw, .. } => raw,
            Self::CalibrationRejected(raw) => raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_ending_bytes() {
        assert_eq!(LineEnding::default().terminate("CALIBRATE"), b"CALIBRATE\r\n");
        assert_eq!(LineEnding::Lf.terminate("X"), b"X\n");
        assert_eq!(LineEnding::Cr.bytes(), b"\r");
    }

    #[test]
    fn test_error_keeps_raw_text() {
        let err = ProtocolError::UnexpectedShape("GARBAGE".into());
        assert_eq!(err.raw(), "GARBAGE");
        assert!(err.to_string().contains("GARBAGE"));
    }
}
