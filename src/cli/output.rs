//! Output rendering for CLI commands

use crate::core::{EquipmentStatus, HealthMetric, StateTransition, TestResult};
use clap::ValueEnum;
use serde::Serialize;

/// CLI output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format for scripting
    Json,
}

#[derive(Serialize)]
struct StatusReport<'a> {
    status: EquipmentStatus,
    last_error: &'a str,
    connection: &'a str,
    health: &'a [HealthMetric],
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

/// Render a test result
pub fn format_result(result: &TestResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(result),
        OutputFormat::Text => {
            let mut out = format!(
                "Test {} on {}: {}\n",
                result.test_id,
                result.device_id,
                if result.passed { "PASS" } else { "FAIL" }
            );
            if !result.units.is_empty() {
                out.push_str(&format!(
                    "  Measurement: {} {}\n",
                    result.measurement_value, result.units
                ));
            }
            out.push_str(&format!("  Time:  {}\n", result.timestamp));
            out.push_str(&format!("  Notes: {}", result.notes));
            out
        }
    }
}

/// Render status, last error, link and health readings
pub fn format_status(
    status: EquipmentStatus,
    last_error: &str,
    connection: &str,
    health: &[HealthMetric],
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Json => to_json(&StatusReport {
            status,
            last_error,
            connection,
            health,
        }),
        OutputFormat::Text => {
            let mut out = format!("Status:     {}\nConnection: {}\n", status, connection);
            if !last_error.is_empty() {
                out.push_str(&format!("Last error: {}\n", last_error));
            }
            out.push_str("Health:");
            for metric in health {
                out.push_str(&format!("\n  {:<18} {:.3}", metric.name, metric.value));
            }
            out
        }
    }
}

/// Render transition history, oldest first
pub fn format_history(history: &[StateTransition], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(&history),
        OutputFormat::Text if history.is_empty() => "No transitions yet".to_string(),
        OutputFormat::Text => history
            .iter()
            .map(|t| {
                format!(
                    "{}  {} -> {}  {}",
                    t.timestamp.format("%H:%M:%S%.3f"),
                    t.from,
                    t.to,
                    t.message
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Render a port list
pub fn format_ports(ports: &[String], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(&ports),
        OutputFormat::Text if ports.is_empty() => "No serial ports found.".to_string(),
        OutputFormat::Text => ports.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TestResult {
        TestResult {
            test_id: "TEST_20240309140507000".into(),
            device_id: "DUT-1".into(),
            passed: true,
            measurement_value: 5.0,
            units: "V".into(),
            timestamp: "2024-03-09 14:05:07".into(),
            notes: "Test completed successfully".into(),
        }
    }

    #[test]
    fn test_result_text() {
        let text = format_result(&sample(), OutputFormat::Text);
        assert!(text.starts_with("Test TEST_20240309140507000 on DUT-1: PASS"));
        assert!(text.contains("Measurement: 5 V"));
    }

    #[test]
    fn test_result_json() {
        let json = format_result(&sample(), OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["device_id"], "DUT-1");
        assert_eq!(value["passed"], true);
        assert_eq!(value["measurement_value"], 5.0);
    }

    #[test]
    fn test_status_json() {
        let health = vec![HealthMetric {
            name: "Temperature",
            value: 23.5,
        }];
        let json = format_status(
            EquipmentStatus::Running,
            "",
            "Simulated instrument",
            &health,
            OutputFormat::Json,
        );
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "RUNNING");
        assert_eq!(value["health"][0]["name"], "Temperature");
    }

    #[test]
    fn test_empty_lists() {
        assert_eq!(format_ports(&[], OutputFormat::Text), "No serial ports found.");
        assert_eq!(format_history(&[], OutputFormat::Text), "No transitions yet");
        assert_eq!(format_ports(&[], OutputFormat::Json), "[]");
    }
}
