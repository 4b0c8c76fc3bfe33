//! Equipment status and status-change notification types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Equipment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentStatus {
    /// Ready, not executing tests
    #[default]
    Idle,
    /// Accepting test commands
    Running,
    /// Temporarily halted, resumable
    Paused,
    /// Last calibration or initialization failed
    Error,
    /// Calibration in progress
    Maintenance,
}

impl EquipmentStatus {
    /// All statuses in declaration order
    pub fn all() -> &'static [EquipmentStatus] {
        &[
            Self::Idle,
            Self::Running,
            Self::Paused,
            Self::Error,
            Self::Maintenance,
        ]
    }

    /// Upper-case name used in CLI output and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Error => "ERROR",
            Self::Maintenance => "MAINTENANCE",
        }
    }

    /// Check if `start()` is allowed from this status
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Paused)
    }

    /// Check if tests may be executed in this status
    pub fn can_run_tests(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handler invoked on every status change with the new status and a message.
///
/// Handlers run synchronously on the thread that caused the transition,
/// after the controller's state lock has been released. They may query the
/// controller, but should return promptly: the operation that triggered
/// them does not return until they do.
pub type StatusCallback = Arc<dyn Fn(EquipmentStatus, &str) + Send + Sync>;

/// Recorded status change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous status
    pub from: EquipmentStatus,
    /// New status
    pub to: EquipmentStatus,
    /// When the transition happened
    pub timestamp: DateTime<Local>,
    /// Message passed to the status callback
    pub message: String,
}
