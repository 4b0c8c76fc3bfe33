//! Equipment State Machine
//!
//! Guards lifecycle transitions, keeps the sticky last-error string and a
//! bounded transition history. The controller wraps one of these in a mutex;
//! nothing here locks or notifies on its own.

use super::status::{EquipmentStatus, StateTransition};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Lifecycle operation requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Enter Running from Idle or Paused
    Start,
    /// Return to Idle from anywhere
    Stop,
    /// Running -> Paused
    Pause,
    /// Paused -> Running
    Resume,
    /// Idle -> Maintenance (calibration begins)
    Calibrate,
}

impl Operation {
    /// Status reached when the operation is accepted
    pub fn target(&self) -> EquipmentStatus {
        match self {
            Self::Start | Self::Resume => EquipmentStatus::Running,
            Self::Stop => EquipmentStatus::Idle,
            Self::Pause => EquipmentStatus::Paused,
            Self::Calibrate => EquipmentStatus::Maintenance,
        }
    }

    /// Notification message for an accepted operation
    pub fn message(&self) -> &'static str {
        match self {
            Self::Start => "Equipment started",
            Self::Stop => "Equipment stopped",
            Self::Pause => "Equipment paused",
            Self::Resume => "Equipment resumed",
            Self::Calibrate => "Calibration in progress",
        }
    }

    /// Last-error text for a rejected operation
    pub fn rejection(&self) -> &'static str {
        match self {
            Self::Start => "Equipment must be in IDLE or PAUSED state to start",
            Self::Stop => "Equipment cannot be stopped",
            Self::Pause => "Equipment must be running to pause",
            Self::Resume => "Equipment must be paused to resume",
            Self::Calibrate => "Equipment must be idle for calibration",
        }
    }

    fn is_allowed_from(&self, status: EquipmentStatus) -> bool {
        use EquipmentStatus::*;

        match (self, status) {
            (Self::Start, s) => s.can_start(),
            (Self::Stop, _) => true,
            (Self::Pause, Running) => true,
            (Self::Resume, Paused) => true,
            (Self::Calibrate, Idle) => true,
            _ => false,
        }
    }
}

/// Backoff policy for retrying failed command sends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Delay multiplier (exponential backoff)
    pub backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy with the default backoff and the given retry count
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f32() * multiplier;
        let capped = delay_secs.min(self.max_delay.as_secs_f32());

        Duration::from_secs_f32(capped)
    }

    /// Check if another retry is allowed after `retries_done` retries
    pub fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }
}

/// Equipment state machine
#[derive(Debug)]
pub struct EquipmentStateMachine {
    status: EquipmentStatus,
    last_error: String,
    history: VecDeque<StateTransition>,
    max_history: usize,
    transitions: u64,
}

impl Default for EquipmentStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl EquipmentStateMachine {
    /// Create a state machine in Idle with no error recorded
    pub fn new() -> Self {
        Self {
            status: EquipmentStatus::Idle,
            last_error: String::new(),
            history: VecDeque::new(),
            max_history: 100,
            transitions: 0,
        }
    }

    /// Current status
    pub fn status(&self) -> EquipmentStatus {
        self.status
    }

    /// Most recent failure description (empty if none yet)
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Overwrite the sticky last-error
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = error.into();
    }

    /// Transition history, oldest first
    pub fn history(&self) -> impl Iterator<Item = &StateTransition> {
        self.history.iter()
    }

    /// Number of transitions since creation (not bounded by history size)
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Apply a guarded operation.
    ///
    /// Returns the transition to announce, `None` when the operation is
    /// accepted but the status does not change (stop while Idle), or the
    /// rejection message, which is also recorded as the last error.
    pub fn apply(&mut self, op: Operation) -> Result<Option<StateTransition>, &'static str> {
        if !op.is_allowed_from(self.status) {
            self.record_error(op.rejection());
            return Err(op.rejection());
        }

        if op == Operation::Stop && self.status == EquipmentStatus::Idle {
            return Ok(None);
        }

        Ok(Some(self.force(op.target(), op.message())))
    }

    /// Move from `expected` to `to`, or do nothing when another caller has
    /// already moved the status away from `expected`
    pub fn complete(
        &mut self,
        expected: EquipmentStatus,
        to: EquipmentStatus,
        message: &str,
    ) -> Option<StateTransition> {
        (self.status == expected).then(|| self.force(to, message))
    }

    /// Unconditionally move to `to`. Used for initialization, where the
    /// connect outcome rather than the current status decides what follows.
    pub fn force(&mut self, to: EquipmentStatus, message: &str) -> StateTransition {
        let transition = StateTransition {
            from: self.status,
            to,
            timestamp: Local::now(),
            message: message.to_string(),
        };

        self.history.push_back(transition.clone());
        if self.history.len() > self.max_history {
            self.history.pop_front();
        }

        self.status = to;
        self.transitions += 1;
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_lifecycle() {
        let mut sm = EquipmentStateMachine::new();
        assert_eq!(sm.status(), EquipmentStatus::Idle);

        sm.apply(Operation::Start).unwrap();
        assert_eq!(sm.status(), EquipmentStatus::Running);

        sm.apply(Operation::Pause).unwrap();
        assert_eq!(sm.status(), EquipmentStatus::Paused);

        sm.apply(Operation::Resume).unwrap();
        assert_eq!(sm.status(), EquipmentStatus::Running);

        sm.apply(Operation::Stop).unwrap();
        assert_eq!(sm.status(), EquipmentStatus::Idle);
        assert_eq!(sm.transition_count(), 4);
    }

    #[test]
    fn test_rejection_is_sticky() {
        let mut sm = EquipmentStateMachine::new();

        let err = sm.apply(Operation::Pause).unwrap_err();
        assert_eq!(err, "Equipment must be running to pause");
        assert_eq!(sm.last_error(), err);
        assert_eq!(sm.status(), EquipmentStatus::Idle);

        // A later success leaves the error in place
        sm.apply(Operation::Start).unwrap();
        assert_eq!(sm.last_error(), err);
    }

    #[test]
    fn test_start_rejected_while_running_or_in_error() {
        let mut sm = EquipmentStateMachine::new();
        sm.apply(Operation::Start).unwrap();
        assert!(sm.apply(Operation::Start).is_err());

        sm.force(EquipmentStatus::Error, "Calibration failed");
        assert!(sm.apply(Operation::Start).is_err());
        assert_eq!(sm.status(), EquipmentStatus::Error);
    }

    #[test]
    fn test_stop_while_idle_is_silent() {
        let mut sm = EquipmentStateMachine::new();
        assert!(sm.apply(Operation::Stop).unwrap().is_none());
        assert_eq!(sm.transition_count(), 0);
    }

    #[test]
    fn test_calibrate_only_from_idle() {
        let mut sm = EquipmentStateMachine::new();
        sm.apply(Operation::Start).unwrap();
        assert!(sm.apply(Operation::Calibrate).is_err());

        sm.apply(Operation::Stop).unwrap();
        let t = sm.apply(Operation::Calibrate).unwrap().unwrap();
        assert_eq!(t.from, EquipmentStatus::Idle);
        assert_eq!(t.to, EquipmentStatus::Maintenance);
    }

    #[test]
    fn test_complete_requires_expected_status() {
        let mut sm = EquipmentStateMachine::new();
        sm.apply(Operation::Calibrate).unwrap();
        sm.apply(Operation::Stop).unwrap();
        sm.apply(Operation::Start).unwrap();

        let skipped = sm.complete(
            EquipmentStatus::Maintenance,
            EquipmentStatus::Idle,
            "Calibration completed successfully",
        );
        assert!(skipped.is_none());
        assert_eq!(sm.status(), EquipmentStatus::Running);
        assert_eq!(sm.transition_count(), 3);

        sm.apply(Operation::Stop).unwrap();
        sm.apply(Operation::Calibrate).unwrap();
        let t = sm
            .complete(
                EquipmentStatus::Maintenance,
                EquipmentStatus::Error,
                "Calibration failed",
            )
            .unwrap();
        assert_eq!(t.from, EquipmentStatus::Maintenance);
        assert_eq!(sm.status(), EquipmentStatus::Error);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut sm = EquipmentStateMachine::new();
        for _ in 0..150 {
            sm.force(EquipmentStatus::Running, "run");
            sm.force(EquipmentStatus::Idle, "idle");
        }
        assert_eq!(sm.history().count(), 100);
        assert_eq!(sm.transition_count(), 300);
    }

    #[test]
    fn test_retry_policy() {
        let policy = RetryPolicy::with_retries(3);

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(50));
        let second = policy.delay_for_attempt(1).as_secs_f64();
        assert!((second - 0.1).abs() < 1e-3);
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(1));
    }
}
