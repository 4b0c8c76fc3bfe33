//! Equipment health metrics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Named numeric reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthMetric {
    /// Metric name
    pub name: &'static str,
    /// Current value
    pub value: f64,
}

impl HealthMetric {
    fn new(name: &'static str, value: f64) -> Self {
        Self { name, value }
    }
}

/// Sensor defaults reported while no telemetry source is attached
const SIMULATED_TEMPERATURE_C: f64 = 23.5;
const SIMULATED_VIBRATION_G: f64 = 0.02;
const SIMULATED_POWER_W: f64 = 125.3;

/// Metric names, in report order
pub const METRIC_NAMES: [&str; 5] = [
    "Temperature",
    "Vibration",
    "Power_Consumption",
    "Uptime_Hours",
    "Error_Rate",
];

/// Tracks the counters behind the computed metrics.
///
/// Counters are atomics so tests can be recorded without taking the
/// controller's state lock.
#[derive(Debug)]
pub struct HealthMonitor {
    started: Instant,
    tests_run: AtomicU64,
    tests_failed: AtomicU64,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    /// Start tracking from now
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            tests_run: AtomicU64::new(0),
            tests_failed: AtomicU64::new(0),
        }
    }

    /// Count a finished test
    pub fn record_test(&self, passed: bool) {
        self.tests_run.fetch_add(1, Ordering::Relaxed);
        if !passed {
            self.tests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Tests counted so far
    pub fn tests_run(&self) -> u64 {
        self.tests_run.load(Ordering::Relaxed)
    }

    /// Fraction of counted tests that failed, 0.0 before the first test
    pub fn error_rate(&self) -> f64 {
        let run = self.tests_run.load(Ordering::Relaxed);
        if run == 0 {
            return 0.0;
        }
        self.tests_failed.load(Ordering::Relaxed) as f64 / run as f64
    }

    /// Current readings; always the same keys in [`METRIC_NAMES`] order
    pub fn snapshot(&self) -> Vec<HealthMetric> {
        let uptime_hours = self.started.elapsed().as_secs_f64() / 3600.0;

        vec![
            HealthMetric::new(METRIC_NAMES[0], SIMULATED_TEMPERATURE_C),
            HealthMetric::new(METRIC_NAMES[1], SIMULATED_VIBRATION_G),
            HealthMetric::new(METRIC_NAMES[2], SIMULATED_POWER_W),
            HealthMetric::new(METRIC_NAMES[3], uptime_hours),
            HealthMetric::new(METRIC_NAMES[4], self.error_rate()),
        ]
    }
}
