//! CLI Module
//!
//! Provides command-line interface support:
//! - Exit codes for automation
//! - Text/JSON rendering of results, status and history

pub mod exit_codes;
pub mod output;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};
pub use output::{format_history, format_ports, format_result, format_status, OutputFormat};
