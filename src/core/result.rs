//! Test results

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Outcome of one `run_test` call.
///
/// Built once per invocation and handed to the caller; nothing in the
/// controller keeps a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Unique id, `TEST_<timestamp>`
    pub test_id: String,
    /// Device under test
    pub device_id: String,
    /// Instrument verdict was PASS
    pub passed: bool,
    /// Measured value (0.0 when no measurement was obtained)
    pub measurement_value: f64,
    /// Unit label (empty when no measurement was obtained)
    pub units: String,
    /// Local time the test started, `YYYY-mm-dd HH:MM:SS`
    pub timestamp: String,
    /// Human-readable outcome or failure reason
    pub notes: String,
}

impl TestResult {
    pub(crate) fn started(device_id: &str, now: DateTime<Local>) -> Self {
        Self {
            test_id: format!("TEST_{}", now.format("%Y%m%d%H%M%S%3f")),
            device_id: device_id.to_string(),
            passed: false,
            measurement_value: 0.0,
            units: String::new(),
            timestamp: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            notes: String::new(),
        }
    }

    pub(crate) fn failed(mut self, notes: impl Into<String>) -> Self {
        self.passed = false;
        self.notes = notes.into();
        self
    }

    pub(crate) fn measured(mut self, value: f64, units: String, passed: bool) -> Self {
        self.measurement_value = value;
        self.units = units;
        self.passed = passed;
        self.notes = "Test completed successfully".to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_ids_and_timestamp_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let result = TestResult::started("DUT-1", now);
        assert_eq!(result.test_id, "TEST_20240309140507000");
        assert_eq!(result.timestamp, "2024-03-09 14:05:07");
        assert_eq!(result.device_id, "DUT-1");
        assert!(!result.passed);
    }

    #[test]
    fn test_failed_keeps_identity() {
        let now = Local::now();
        let result = TestResult::started("DUT-1", now).failed("No response from device");
        assert_eq!(result.device_id, "DUT-1");
        assert_eq!(result.notes, "No response from device");
        assert!(!result.passed);
    }
}
