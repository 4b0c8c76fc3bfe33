//! # Mechatest Core Library
//!
//! Controller for a single piece of automated test equipment reached over a
//! line-oriented serial link:
//! - Lifecycle state machine (Idle, Running, Paused, Error, Maintenance)
//! - Test execution (`TEST:` / `RESULT:` exchange)
//! - Calibration (`CALIBRATE` / `CAL_OK` exchange)
//! - Status-change notifications
//! - Health metrics
//! - Serial and simulated transports
//!
//! ## Example
//!
//! ```rust,no_run
//! use mechatest_core::{EquipmentConfig, EquipmentController};
//!
//! fn main() -> anyhow::Result<()> {
//!     let controller = EquipmentController::new();
//!     controller.set_status_callback(|status, message| {
//!         println!("{status}: {message}");
//!     });
//!
//!     controller.initialize(EquipmentConfig::new("/dev/ttyUSB0", 115200))?;
//!     controller.start()?;
//!
//!     let result = controller.run_test("DUT-001", &["voltage", "5.0"]);
//!     println!("{} {} {}", result.passed, result.measurement_value, result.units);
//!
//!     controller.stop()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{ConfigError, EquipmentConfig};
pub use crate::core::codec::{Command, ProtocolError, TestResponse};
pub use crate::core::health::HealthMetric;
pub use crate::core::result::TestResult;
pub use crate::core::status::{EquipmentStatus, StateTransition, StatusCallback};
pub use crate::core::transport::{
    create_transport, SerialTransport, SimulatedTransport, Transport, TransportError,
    TransportType,
};
pub use crate::core::{ControllerError, EquipmentController};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
