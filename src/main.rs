//! fetch-queue entry point.
//!
//! ## CLI Subcommands
//!
//! - `fetch-queue schedule <MODULE> <VERSION>` - Schedule one fetch
//! - `fetch-queue task-id <MODULE> <VERSION>` - Print the task-service id
//! - `fetch-queue config [show|defaults|validate]` - Inspect configuration

use std::path::PathBuf;
use std::process::ExitCode;

use fetch_queue::cli::{self, config_cmd, ScheduleArgs, TaskIdArgs};
use fetch_queue::telemetry::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    if let Err(e) = init_logging(&LogConfig::from_env()) {
        eprintln!("Logging disabled: {}", e);
    }

    match command {
        "schedule" => match ScheduleArgs::parse(&args[2..]) {
            Ok(parsed) => exit(cli::run_schedule(&parsed).await),
            Err(e) => {
                eprintln!("{}", e);
                print_command_help("schedule");
                ExitCode::FAILURE
            }
        },
        "task-id" => match TaskIdArgs::parse(&args[2..]) {
            Ok(parsed) => exit(cli::run_task_id(&parsed)),
            Err(e) => {
                eprintln!("{}", e);
                print_command_help("task-id");
                ExitCode::FAILURE
            }
        },
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            let rest = args.get(3..).unwrap_or_default();
            let file = match flag(rest, "--file") {
                Ok(file) => file.map(PathBuf::from),
                Err(e) => {
                    eprintln!("{}", e);
                    return ExitCode::FAILURE;
                }
            };
            match subcommand {
                "show" => {
                    let json = rest.iter().any(|a| a == "--json");
                    exit(config_cmd::run_show(file.as_ref(), json))
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit(config_cmd::run_validate(file.as_ref())),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("fetch-queue {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Value of `name` in `args`, if present.
fn flag<'a>(args: &'a [String], name: &str) -> Result<Option<&'a str>, String> {
    match args.iter().position(|a| a == name) {
        None => Ok(None),
        Some(i) => args
            .get(i + 1)
            .map(|v| Some(v.as_str()))
            .ok_or_else(|| format!("Missing value for {}", name)),
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "fetch-queue - Module fetch scheduling v{}

USAGE:
    fetch-queue [COMMAND] [OPTIONS]

COMMANDS:
    schedule     Schedule a fetch of MODULE@VERSION
    task-id      Print the task-service id for MODULE@VERSION
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

OPTIONS:
    -h, --help     Show help for command
    -V, --version  Show version information

EXAMPLES:
    fetch-queue schedule golang.org/x/net v0.1.0
    fetch-queue schedule golang.org/x/net v0.1.0 --frontend --suffix retry
    fetch-queue task-id golang.org/x/net v0.1.0 --at 2024-03-01T12:00:00Z
    fetch-queue config show --json

ENVIRONMENT:
    FETCH_QUEUE_ENV          local (in-process workers) or managed (task service)
    FETCH_QUEUE_WORKERS      In-process worker count (default: 10)
    FETCH_QUEUE_TARGET_URL   Base URL of the processing endpoint
    FETCH_QUEUE_LOG          Log filter (falls back to RUST_LOG)
    FETCH_QUEUE_LOG_FORMAT   pretty or json

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "schedule" => {
            eprintln!(
                "fetch-queue schedule - Schedule one fetch

USAGE:
    fetch-queue schedule <MODULE> <VERSION> [OPTIONS]

OPTIONS:
    --frontend             Mark the request as coming from the frontend
    --no-proxy-fetch       Ask the processor not to fetch from the proxy
    --suffix S             Append S to the task name to force a new task
    --processor-url URL    Processing endpoint for the in-process backend
    --config FILE          Load configuration from a TOML file

DESCRIPTION:
    In a managed environment the fetch is handed to the task service and
    the command prints whether it was enqueued or already scheduled.
    Otherwise the fetch runs in this process against the processing
    endpoint and the command waits for it to finish.
"
            );
        }
        "task-id" => {
            eprintln!(
                "fetch-queue task-id - Print the task-service id

USAGE:
    fetch-queue task-id <MODULE> <VERSION> [OPTIONS]

OPTIONS:
    --at TIME          RFC 3339 time to derive the id for (default: now)
    --interval SECS    Dedup window in seconds (default: from config)
    --config FILE      Load configuration from a TOML file
"
            );
        }
        "config" => {
            eprintln!(
                "fetch-queue config - Inspect configuration

USAGE:
    fetch-queue config <SUBCOMMAND> [OPTIONS]

SUBCOMMANDS:
    show           Show effective configuration
    defaults       Show default configuration
    validate       Validate configuration for the selected backend

OPTIONS:
    --file PATH    Configuration file path
    --json         Output in JSON format (show only)
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'fetch-queue help' for general usage.",
                command
            );
        }
    }
}
