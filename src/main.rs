//! Mechatest - command-line front end for the equipment controller

use anyhow::Context;
use clap::{Parser, Subcommand};
use mechatest_core::cli::{
    format_history, format_ports, format_result, format_status, print_exit_codes, CliResult,
    ExitCodes, OutputFormat,
};
use mechatest_core::core::transport::list_ports;
use mechatest_core::{EquipmentConfig, EquipmentController};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_DEVICE: &str = "DUT-001";
const DEFAULT_PARAMS: [&str; 4] = ["voltage", "5.0", "current", "0.1"];

/// Mechatest CLI
#[derive(Parser, Debug)]
#[command(
    name = "mechatest",
    version,
    about = "Controller for serial-attached test equipment",
    long_about = None
)]
struct Cli {
    /// Config file (TOML, or YAML by extension)
    #[arg(short, long, env = "MECHATEST_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port name (e.g., COM3, /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Transport selection key (serial, simulated)
    #[arg(short, long)]
    interface: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show status and health metrics
    Status,

    /// Start the equipment, run one test and stop
    Test {
        /// Device under test
        device: String,

        /// Test parameter, repeatable
        #[arg(short = 'P', long = "param")]
        params: Vec<String>,
    },

    /// Run instrument calibration
    Calibrate,

    /// Read commands from stdin
    Interactive,

    /// List available serial ports
    ListPorts,

    /// Print the exit code table
    ExitCodes,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match run(&cli) {
        Ok(result) => result,
        Err(e) => CliResult::error(ExitCodes::ERROR, format!("{:#}", e)),
    };

    match &result {
        CliResult::Success(Some(msg)) if !cli.quiet => println!("{}", msg),
        CliResult::Error(_, msg) => eprintln!("Error: {}", msg),
        _ => {}
    }
    result.to_exit_code()
}

fn run(cli: &Cli) -> anyhow::Result<CliResult> {
    match cli.command {
        Some(Commands::ExitCodes) => {
            print_exit_codes();
            return Ok(CliResult::success());
        }
        Some(Commands::ListPorts) => {
            let ports: Vec<String> = list_ports()
                .context("Failed to enumerate serial ports")?
                .into_iter()
                .map(|p| p.port_name)
                .collect();
            println!("{}", format_ports(&ports, cli.format));
            return Ok(CliResult::success());
        }
        _ => {}
    }

    let config = match load_config(cli) {
        Ok(config) => config,
        Err(result) => return Ok(result),
    };
    let _log_guard = init_logging(cli, &config);

    tracing::info!("Starting Mechatest v{}", mechatest_core::VERSION);

    let controller = EquipmentController::new();
    if !cli.quiet {
        controller.set_status_callback(|status, message| {
            eprintln!("[{}] {}", status, message);
        });
    }

    if controller.initialize(config).is_err() {
        eprintln!("Warning: {}", controller.last_error());
        eprintln!("Continuing without hardware; tests will report the link as down.");
    }

    let result = match &cli.command {
        Some(Commands::Status) => {
            print_status(&controller, cli.format);
            CliResult::success()
        }
        Some(Commands::Test { device, params }) => {
            run_single_test(&controller, device, params, cli.format)
        }
        Some(Commands::Calibrate) => match controller.calibrate() {
            Ok(()) => CliResult::success_with_message("Calibration completed successfully"),
            Err(e) => CliResult::from(&e),
        },
        Some(Commands::Interactive) | None => interactive(&controller, cli.format)?,
        Some(Commands::ListPorts | Commands::ExitCodes) => CliResult::success(),
    };

    controller.shutdown();
    Ok(result)
}

fn load_config(cli: &Cli) -> Result<EquipmentConfig, CliResult> {
    let mut config = match &cli.config {
        Some(path) => EquipmentConfig::load_from(path)?,
        None => EquipmentConfig::load()?,
    };

    if let Some(port) = &cli.port {
        config = config.with_port(port);
    }
    if let Some(baud) = cli.baud {
        config = config.with_baud_rate(baud);
    }
    if let Some(interface) = &cli.interface {
        config = config.with_interface(interface);
    }

    config.validate()?;
    Ok(config)
}

/// Console logging to stderr, plus the configured log file when enabled.
/// The returned guard flushes the file writer on drop.
fn init_logging(cli: &Cli, config: &EquipmentConfig) -> Option<WorkerGuard> {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let (file_layer, guard) = if config.enable_logging {
        match file_appender(&config.log_file_path) {
            Ok(appender) => {
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(LevelFilter::INFO);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!(
                    "Warning: cannot open log file {}: {}",
                    config.log_file_path.display(),
                    e
                );
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();

    guard
}

fn file_appender(path: &Path) -> anyhow::Result<RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("log_file_path has no file name")?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .context("failed to create log file appender")
}

fn print_status(controller: &EquipmentController, format: OutputFormat) {
    println!(
        "{}",
        format_status(
            controller.status(),
            &controller.last_error(),
            &controller.connection_info(),
            &controller.health_metrics(),
            format,
        )
    );
}

fn run_single_test(
    controller: &EquipmentController,
    device: &str,
    params: &[String],
    format: OutputFormat,
) -> CliResult {
    if let Err(e) = controller.start() {
        return CliResult::from(&e);
    }

    let result = if params.is_empty() {
        controller.run_test(device, &DEFAULT_PARAMS)
    } else {
        controller.run_test(device, params)
    };
    println!("{}", format_result(&result, format));

    let _ = controller.stop();

    if result.passed {
        CliResult::success()
    } else {
        CliResult::test_failed(result.notes)
    }
}

const INTERACTIVE_HELP: &str = "\
Commands:
  start | stop | pause | resume
  test [device] [param]...
  calibrate
  status | metrics | history
  help | quit";

fn interactive(
    controller: &EquipmentController,
    format: OutputFormat,
) -> anyhow::Result<CliResult> {
    println!("{}", INTERACTIVE_HELP);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    loop {
        print!("mechatest> ");
        stdout.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };

        let outcome = match command {
            "start" => controller.start(),
            "stop" => controller.stop(),
            "pause" => controller.pause(),
            "resume" => controller.resume(),
            "calibrate" => {
                println!("Calibrating...");
                controller.calibrate()
            }
            "test" => {
                let device = words.next().unwrap_or(DEFAULT_DEVICE);
                let params: Vec<&str> = words.collect();
                let result = if params.is_empty() {
                    controller.run_test(device, &DEFAULT_PARAMS)
                } else {
                    controller.run_test(device, &params)
                };
                println!("{}", format_result(&result, format));
                Ok(())
            }
            "status" => {
                print_status(controller, format);
                Ok(())
            }
            "metrics" => {
                for metric in controller.health_metrics() {
                    println!("{:<18} {:.3}", metric.name, metric.value);
                }
                Ok(())
            }
            "history" => {
                println!("{}", format_history(&controller.history(), format));
                Ok(())
            }
            "help" | "?" => {
                println!("{}", INTERACTIVE_HELP);
                Ok(())
            }
            "quit" | "exit" => break,
            other => {
                println!("Unknown command '{}', type 'help'", other);
                Ok(())
            }
        };

        if let Err(e) = outcome {
            println!("Error: {}", e);
        }
    }

    Ok(CliResult::success())
}
