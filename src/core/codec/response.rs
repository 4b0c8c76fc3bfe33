//! Response decoding

use super::{ProtocolError, FIELD_SEPARATOR};
use std::str::FromStr;

/// Leading token of a test response
pub const RESULT_TAG: &str = "RESULT";

/// Substring that marks a successful calibration
pub const CALIBRATION_OK_MARKER: &str = "CAL_OK";

const PASS_VERDICT: &str = "PASS";

/// Decoded `RESULT:<value>:<units>:<verdict>` line
#[derive(Debug, Clone, PartialEq)]
pub struct TestResponse {
    /// Measured value
    pub value: f64,
    /// Unit label as sent by the instrument
    pub units: String,
    /// True only for the literal verdict `PASS`
    pub passed: bool,
}

impl TestResponse {
    /// Decode a response line
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let tokens: Vec<&str> = line.split(FIELD_SEPARATOR).collect();

        let [tag, value, units, verdict] = tokens.as_slice() else {
            return Err(ProtocolError::UnexpectedShape(line.to_string()));
        };
        if *tag != RESULT_TAG {
            return Err(ProtocolError::UnexpectedShape(line.to_string()));
        }

        let token = value;
        let value = token
            .trim()
            .parse::<f64>()
            .map_err(|source| ProtocolError::InvalidValue {
                value: token.to_string(),
                raw: line.to_string(),
                source,
            })?;
        if !value.is_finite() {
            return Err(ProtocolError::NonFiniteValue {
                value: token.to_string(),
                raw: line.to_string(),
            });
        }

        Ok(Self {
            value,
            units: units.to_string(),
            passed: *verdict == PASS_VERDICT,
        })
    }
}

impl FromStr for TestResponse {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Check a calibration reply
pub fn is_calibration_ok(response: &str) -> bool {
    response.contains(CALIBRATION_OK_MARKER)
}

/// Decode a calibration reply
pub fn decode_calibration(response: &str) -> Result<(), ProtocolError> {
    if is_calibration_ok(response) {
        Ok(())
    } else {
        Err(ProtocolError::CalibrationRejected(response.to_string()))
    }
}
