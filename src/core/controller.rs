//! Equipment controller
//!
//! Owns one transport, enforces the lifecycle state machine and runs tests
//! and calibrations over the line protocol. Every operation runs on the
//! calling thread and blocks for its full I/O, including poll loops and the
//! calibration settling delay.
//!
//! Locking: `state` guards status, last-error, history, config and the
//! status callback; `transport` guards the link for a whole
//! command/response cycle. The two are never held at the same time, and the
//! status callback runs with neither held.

use super::codec::{
    decode_calibration, Command, ProtocolError, TestResponse, CALIBRATION_RESPONSE_TIMEOUT,
    CALIBRATION_SETTLE_DELAY, TEST_RESPONSE_TIMEOUT,
};
use super::health::{HealthMetric, HealthMonitor};
use super::result::TestResult;
use super::state_machine::{EquipmentStateMachine, Operation, RetryPolicy};
use super::status::{EquipmentStatus, StateTransition, StatusCallback};
use super::transport::{create_transport, Transport, TransportError, TransportStats};
use crate::config::EquipmentConfig;
use chrono::Local;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Controller error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Transport could not be created, opened or used
    #[error("{0}")]
    Connection(String),

    /// Operation not valid in the current status
    #[error("{0}")]
    State(String),

    /// Instrument reply could not be decoded or was negative
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Instrument did not answer in time
    #[error("No response from device within {0:?}")]
    Timeout(Duration),
}

struct ControllerState {
    machine: EquipmentStateMachine,
    callback: Option<StatusCallback>,
    config: Option<EquipmentConfig>,
}

impl ControllerState {
    fn retry_policy(&self) -> RetryPolicy {
        match &self.config {
            Some(config) => RetryPolicy::with_retries(config.max_retry_attempts),
            None => RetryPolicy::default(),
        }
    }
}

/// Controller for one piece of test equipment.
///
/// `EquipmentController` is `Send + Sync`; share it with `Arc` to drive it
/// from several threads. Test and calibration exchanges are serialized on
/// the transport so only one command/response cycle is in flight.
pub struct EquipmentController {
    state: Mutex<ControllerState>,
    transport: Mutex<Option<Box<dyn Transport>>>,
    injected: bool,
    health: HealthMonitor,
}

impl Default for EquipmentController {
    fn default() -> Self {
        Self::new()
    }
}

impl EquipmentController {
    /// Create a controller in Idle. The transport is created from
    /// `EquipmentConfig::interface` on [`Self::initialize`].
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ControllerState {
                machine: EquipmentStateMachine::new(),
                callback: None,
                config: None,
            }),
            transport: Mutex::new(None),
            injected: false,
            health: HealthMonitor::new(),
        }
    }

    /// Create a controller that uses `transport` instead of resolving the
    /// configured interface key. The transport is kept across `initialize`
    /// calls whatever their interface key.
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        let mut controller = Self::new();
        *controller.transport.get_mut() = Some(transport);
        controller.injected = true;
        controller
    }

    /// Connect the transport and enter Idle.
    ///
    /// A failed connect still leaves the controller in Idle (the
    /// equipment can be exercised without hardware, tests will report
    /// "Hardware not connected") but returns the connection error, which is
    /// also stored as the last error. An unknown interface key moves the
    /// controller to Error.
    pub fn initialize(&self, config: EquipmentConfig) -> Result<(), ControllerError> {
        tracing::info!(
            "Initializing equipment on {} @ {} baud via {}",
            config.device_port,
            config.baud_rate,
            config.interface
        );
        tracing::debug!(
            "Measurement tolerance {} is reserved and not applied",
            config.measurement_tolerance
        );

        let port = config.device_port.clone();
        let baud_rate = config.baud_rate;
        let interface = config.interface.clone();
        self.state.lock().config = Some(config);

        let connected = {
            let mut guard = self.transport.lock();
            let reusable = guard
                .as_ref()
                .is_some_and(|t| self.injected || t.transport_type().key() == interface);
            if !reusable {
                if let Some(previous) = guard.as_mut() {
                    let _ = previous.disconnect();
                }
                *guard = create_transport(&interface);
            }
            guard
                .as_mut()
                .map(|transport| transport.connect(&port, baud_rate))
        };

        match connected {
            None => {
                let message = format!("Failed to create hardware interface '{}'", interface);
                self.fail(
                    &message,
                    EquipmentStatus::Error,
                    "Failed to create hardware interface",
                );
                Err(ControllerError::Connection(message))
            }
            Some(Err(e)) => {
                let message = format!("Failed to connect to device on port {}: {}", port, e);
                self.fail(
                    &message,
                    EquipmentStatus::Idle,
                    "Equipment initialized (simulation mode)",
                );
                Err(ControllerError::Connection(message))
            }
            Some(Ok(())) => {
                self.force(EquipmentStatus::Idle, "Equipment initialized successfully");
                Ok(())
            }
        }
    }

    /// Idle or Paused -> Running
    pub fn start(&self) -> Result<(), ControllerError> {
        self.apply(Operation::Start)
    }

    /// Any status -> Idle. Never fails.
    pub fn stop(&self) -> Result<(), ControllerError> {
        self.apply(Operation::Stop)
    }

    /// Running -> Paused
    pub fn pause(&self) -> Result<(), ControllerError> {
        self.apply(Operation::Pause)
    }

    /// Paused -> Running
    pub fn resume(&self) -> Result<(), ControllerError> {
        self.apply(Operation::Resume)
    }

    /// Run one test on `device_id`.
    ///
    /// Never fails: status, link, timeout and decoding problems all come
    /// back as a result with `passed == false` and the reason in `notes`.
    /// Does not change status or the last error.
    pub fn run_test<S: AsRef<str>>(&self, device_id: &str, params: &[S]) -> TestResult {
        let result = TestResult::started(device_id, Local::now());

        let (status, retry) = {
            let state = self.state.lock();
            (state.machine.status(), state.retry_policy())
        };
        if !status.can_run_tests() {
            tracing::debug!("Test on {} refused in status {}", device_id, status);
            return result.failed("Equipment not in running state");
        }

        let command = Command::test(device_id, params);
        let exchange = {
            let mut guard = self.transport.lock();
            match guard.as_mut().filter(|t| t.is_connected()) {
                None => return result.failed("Hardware not connected"),
                Some(transport) => {
                    Self::exchange(&mut **transport, &command, TEST_RESPONSE_TIMEOUT, &retry)
                }
            }
        };

        let result = match exchange {
            Err(Exchange::Send(e)) => {
                result.failed(format!("Failed to send test command: {}", e))
            }
            Err(Exchange::NoResponse) => result.failed("No response from device"),
            Err(Exchange::Receive(e)) => {
                result.failed(format!("Failed to read device response: {}", e))
            }
            Ok(response) => match TestResponse::decode(&response) {
                Ok(decoded) => result.measured(decoded.value, decoded.units, decoded.passed),
                Err(
                    e @ (ProtocolError::InvalidValue { .. }
                    | ProtocolError::NonFiniteValue { .. }),
                ) => {
                    result.failed(format!("Test execution error: {}", e))
                }
                Err(e) => result.failed(e.to_string()),
            },
        };

        self.health.record_test(result.passed);
        tracing::info!(
            "Test {} on {}: {} ({})",
            result.test_id,
            result.device_id,
            if result.passed { "PASS" } else { "FAIL" },
            result.notes
        );
        result
    }

    /// Calibrate the instrument. Idle -> Maintenance, then Idle when the
    /// instrument confirms with `CAL_OK`, Error otherwise.
    ///
    /// If another caller moves the status out of Maintenance while the
    /// calibration runs, the final transition is skipped and that status
    /// stands. The outcome is still returned and a failure still recorded
    /// as the last error.
    pub fn calibrate(&self) -> Result<(), ControllerError> {
        self.apply(Operation::Calibrate)?;

        std::thread::sleep(CALIBRATION_SETTLE_DELAY);

        let outcome = self.calibration_exchange();
        match &outcome {
            Ok(()) => self.finish_calibration(
                EquipmentStatus::Idle,
                "Calibration completed successfully",
                None,
            ),
            Err(e) => self.finish_calibration(
                EquipmentStatus::Error,
                "Calibration failed",
                Some(format!("Calibration failed: {}", e)),
            ),
        }
        outcome
    }

    /// Current status
    pub fn status(&self) -> EquipmentStatus {
        self.state.lock().machine.status()
    }

    /// Most recent failure description; empty until the first failure
    pub fn last_error(&self) -> String {
        self.state.lock().machine.last_error().to_string()
    }

    /// Register the status-change handler, replacing any previous one.
    ///
    /// The handler is called once per status change, after the state lock
    /// is released, on the thread that made the change. Notifications from
    /// different threads are not ordered relative to each other.
    pub fn set_status_callback<F>(&self, callback: F)
    where
        F: Fn(EquipmentStatus, &str) + Send + Sync + 'static,
    {
        self.state.lock().callback = Some(Arc::new(callback));
    }

    /// Current health readings
    pub fn health_metrics(&self) -> Vec<HealthMetric> {
        self.health.snapshot()
    }

    /// Recent status transitions, oldest first
    pub fn history(&self) -> Vec<StateTransition> {
        self.state.lock().machine.history().cloned().collect()
    }

    /// Status changes since construction
    pub fn transition_count(&self) -> u64 {
        self.state.lock().machine.transition_count()
    }

    /// Configuration passed to the last `initialize`
    pub fn config(&self) -> Option<EquipmentConfig> {
        self.state.lock().config.clone()
    }

    /// Check if the transport link is open
    pub fn is_connected(&self) -> bool {
        self.transport
            .lock()
            .as_ref()
            .map_or(false, |t| t.is_connected())
    }

    /// Transport description, e.g. `/dev/ttyUSB0 @ 115200 baud (8N1)`
    pub fn connection_info(&self) -> String {
        self.transport
            .lock()
            .as_ref()
            .map_or_else(|| "No transport".to_string(), |t| t.connection_info())
    }

    /// Transport counters, if a transport exists
    pub fn transport_stats(&self) -> Option<TransportStats> {
        self.transport.lock().as_ref().map(|t| t.stats())
    }

    /// Stop and release the transport link
    pub fn shutdown(&self) {
        let _ = self.stop();
        if let Some(transport) = self.transport.lock().as_mut() {
            let _ = transport.disconnect();
        }
        tracing::info!("Equipment controller shut down");
    }

    fn calibration_exchange(&self) -> Result<(), ControllerError> {
        let retry = self.state.lock().retry_policy();

        let mut guard = self.transport.lock();
        let transport = guard
            .as_mut()
            .filter(|t| t.is_connected())
            .ok_or_else(|| ControllerError::Connection("Hardware not connected".into()))?;

        match Self::exchange(
            &mut **transport,
            &Command::Calibrate,
            CALIBRATION_RESPONSE_TIMEOUT,
            &retry,
        ) {
            Ok(response) => Ok(decode_calibration(&response)?),
            Err(Exchange::NoResponse) => {
                Err(ControllerError::Timeout(CALIBRATION_RESPONSE_TIMEOUT))
            }
            Err(Exchange::Send(e)) => Err(ControllerError::Connection(format!(
                "Failed to send calibration command: {}",
                e
            ))),
            Err(Exchange::Receive(e)) => Err(ControllerError::Connection(format!(
                "Failed to read calibration response: {}",
                e
            ))),
        }
    }

    /// Send one command and wait for one reply. A failed send is retried
    /// only while nothing of the line reached the wire.
    fn exchange(
        transport: &mut dyn Transport,
        command: &Command,
        timeout: Duration,
        retry: &RetryPolicy,
    ) -> Result<String, Exchange> {
        let line = command.encode();

        let mut retries = 0;
        loop {
            match transport.send_command(&line) {
                Ok(()) => break,
                Err(e) if !e.is_resendable() => return Err(Exchange::Send(e)),
                Err(e) if retry.should_retry(retries) => {
                    let delay = retry.delay_for_attempt(retries);
                    retries += 1;
                    tracing::warn!(
                        "Send of '{}' failed ({}), retry {}/{} in {:?}",
                        line,
                        e,
                        retries,
                        retry.max_retries,
                        delay
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(Exchange::Send(e)),
            }
        }

        match transport.receive_response(timeout) {
            Ok(response) if response.is_empty() => Err(Exchange::NoResponse),
            Ok(response) => Ok(response),
            Err(TransportError::Timeout(_)) => {
                tracing::warn!("No response to '{}' within {:?}", line, timeout);
                Err(Exchange::NoResponse)
            }
            Err(e) => Err(Exchange::Receive(e)),
        }
    }

    fn apply(&self, op: Operation) -> Result<(), ControllerError> {
        let (outcome, callback) = {
            let mut state = self.state.lock();
            let outcome = state.machine.apply(op);
            (outcome, state.callback.clone())
        };

        match outcome {
            Ok(Some(transition)) => {
                Self::notify(&transition, callback);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(reason) => {
                tracing::warn!("{:?} rejected: {}", op, reason);
                Err(ControllerError::State(reason.to_string()))
            }
        }
    }

    fn force(&self, to: EquipmentStatus, message: &str) {
        let (transition, callback) = {
            let mut state = self.state.lock();
            let transition = state.machine.force(to, message);
            (transition, state.callback.clone())
        };
        Self::notify(&transition, callback);
    }

    /// Record `error` and move to `to` in one locked step
    fn fail(&self, error: &str, to: EquipmentStatus, message: &str) {
        tracing::error!("{}", error);
        let (transition, callback) = {
            let mut state = self.state.lock();
            state.machine.record_error(error);
            let transition = state.machine.force(to, message);
            (transition, state.callback.clone())
        };
        Self::notify(&transition, callback);
    }

    /// Leave Maintenance for `to`, unless the status already moved on
    fn finish_calibration(&self, to: EquipmentStatus, message: &str, error: Option<String>) {
        if let Some(error) = &error {
            tracing::error!("{}", error);
        }
        let (transition, current, callback) = {
            let mut state = self.state.lock();
            if let Some(error) = error {
                state.machine.record_error(error);
            }
            let transition = state
                .machine
                .complete(EquipmentStatus::Maintenance, to, message);
            (transition, state.machine.status(), state.callback.clone())
        };

        match transition {
            Some(transition) => Self::notify(&transition, callback),
            None => tracing::warn!(
                "Calibration finished while status is {}; not moving to {}",
                current,
                to
            ),
        }
    }

    fn notify(transition: &StateTransition, callback: Option<StatusCallback>) {
        tracing::info!(
            "Status {} -> {}: {}",
            transition.from,
            transition.to,
            transition.message
        );
        if let Some(callback) = callback {
            callback(transition.to, &transition.message);
        }
    }
}

impl Drop for EquipmentController {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.get_mut().as_mut() {
            let _ = transport.disconnect();
        }
    }
}

/// Where a command/response cycle broke down
#[derive(Debug)]
enum Exchange {
    Send(TransportError),
    NoResponse,
    Receive(TransportError),
}
