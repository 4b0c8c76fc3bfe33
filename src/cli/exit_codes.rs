//! CLI Exit Codes
//!
//! Stable exit codes so test benches and scripts can branch on outcome.

use crate::config::ConfigError;
use crate::core::codec::ProtocolError;
use crate::core::ControllerError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Instrument did not answer
    pub const TIMEOUT: u8 = 4;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Instrument reply could not be decoded
    pub const PROTOCOL_ERROR: u8 = 9;

    /// Operation not allowed in the current status
    pub const INVALID_STATE: u8 = 10;

    /// Test ran but did not pass
    pub const TEST_FAILED: u8 = 11;

    /// Calibration was not confirmed
    pub const CALIBRATION_FAILED: u8 = 12;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;

    /// Every defined code, ascending
    pub const ALL: [u8; 11] = [
        Self::SUCCESS,
        Self::ERROR,
        Self::INVALID_ARGS,
        Self::CONNECTION_FAILED,
        Self::TIMEOUT,
        Self::CONFIG_ERROR,
        Self::PROTOCOL_ERROR,
        Self::INVALID_STATE,
        Self::TEST_FAILED,
        Self::CALIBRATION_FAILED,
        Self::INTERNAL_ERROR,
    ];
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message for the user
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Test completed with a FAIL verdict or no measurement
    pub fn test_failed(notes: impl Into<String>) -> Self {
        Self::Error(ExitCodes::TEST_FAILED, notes.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&ControllerError> for CliResult {
    fn from(err: &ControllerError) -> Self {
        let code = match err {
            ControllerError::Connection(_) => ExitCodes::CONNECTION_FAILED,
            ControllerError::State(_) => ExitCodes::INVALID_STATE,
            ControllerError::Timeout(_) => ExitCodes::TIMEOUT,
            ControllerError::Protocol(ProtocolError::CalibrationRejected(_)) => {
                ExitCodes::CALIBRATION_FAILED
            }
            ControllerError::Protocol(_) => ExitCodes::PROTOCOL_ERROR,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<ConfigError> for CliResult {
    fn from(err: ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        ExitCodes::SUCCESS => "Success",
        ExitCodes::ERROR => "General error",
        ExitCodes::INVALID_ARGS => "Invalid arguments",
        ExitCodes::CONNECTION_FAILED => "Connection failed",
        ExitCodes::TIMEOUT => "No response from device",
        ExitCodes::CONFIG_ERROR => "Configuration error",
        ExitCodes::PROTOCOL_ERROR => "Protocol error",
        ExitCodes::INVALID_STATE => "Operation not allowed in current state",
        ExitCodes::TEST_FAILED => "Test failed",
        ExitCodes::CALIBRATION_FAILED => "Calibration failed",
        ExitCodes::INTERNAL_ERROR => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in ExitCodes::ALL {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
