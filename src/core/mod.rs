//! Core module containing the equipment control functionality
//!
//! This module provides:
//! - Status model and transition history
//! - Lifecycle state machine with send retry policy
//! - Line protocol codec (test and calibration exchanges)
//! - Transport layer (serial port, simulated instrument)
//! - Equipment controller tying the above together
//! - Health metrics

pub mod codec;
pub mod controller;
pub mod health;
pub mod result;
pub mod state_machine;
pub mod status;
pub mod transport;

pub use controller::{ControllerError, EquipmentController};
pub use health::HealthMetric;
pub use result::TestResult;
pub use status::{EquipmentStatus, StateTransition, StatusCallback};
