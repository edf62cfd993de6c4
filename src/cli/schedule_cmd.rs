//! `schedule` and `task-id` subcommands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{flag_value, load_config, DEFAULT_PROCESSOR_URL, EXIT_CONFIG, EXIT_FAILURE, EXIT_OK};
use crate::config::QueueConfig;
use crate::experiment::StaticExperiments;
use crate::process::{HttpProcessor, ProcessFetch};
use crate::queue::{derive_task_id, new_backend, Options, Queue, QueueError, Source, PROCESS_TIMEOUT};

/// Parsed `schedule` arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleArgs {
    pub module_path: String,
    pub version: String,
    pub options: Options,
    pub config_file: Option<PathBuf>,
    pub processor_url: Option<String>,
}

impl ScheduleArgs {
    /// Parse the arguments that follow `schedule`.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut parsed = Self::default();
        let mut positional = Vec::new();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--frontend" => {
                    parsed.options.source = Source::Frontend;
                    i += 1;
                }
                "--no-proxy-fetch" => {
                    parsed.options.disable_proxy_fetch = true;
                    i += 1;
                }
                "--suffix" => {
                    parsed.options.suffix = flag_value(args, i)?.to_string();
                    i += 2;
                }
                "--config" => {
                    parsed.config_file = Some(PathBuf::from(flag_value(args, i)?));
                    i += 2;
                }
                "--processor-url" => {
                    parsed.processor_url = Some(flag_value(args, i)?.to_string());
                    i += 2;
                }
                flag if flag.starts_with("--") => return Err(format!("unknown argument: {flag}")),
                value => {
                    positional.push(value.to_string());
                    i += 1;
                }
            }
        }

        match positional.as_slice() {
            [module_path, version] => {
                parsed.module_path = module_path.clone();
                parsed.version = version.clone();
                Ok(parsed)
            }
            _ => Err("usage: fetch-queue schedule <MODULE> <VERSION> [OPTIONS]".to_string()),
        }
    }
}

/// Parsed `task-id` arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskIdArgs {
    pub module_path: String,
    pub version: String,
    pub at: Option<DateTime<Utc>>,
    pub interval: Option<Duration>,
    pub config_file: Option<PathBuf>,
}

impl TaskIdArgs {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut parsed = Self::default();
        let mut positional = Vec::new();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--at" => {
                    let raw = flag_value(args, i)?;
                    let at = DateTime::parse_from_rfc3339(raw)
                        .map_err(|e| format!("invalid --at {raw:?}: {e}"))?;
                    parsed.at = Some(at.with_timezone(&Utc));
                    i += 2;
                }
                "--interval" => {
                    let raw = flag_value(args, i)?;
                    let secs: u64 = raw
                        .parse()
                        .map_err(|_| format!("invalid --interval {raw:?}"))?;
                    parsed.interval = Some(Duration::from_secs(secs));
                    i += 2;
                }
                "--config" => {
                    parsed.config_file = Some(PathBuf::from(flag_value(args, i)?));
                    i += 2;
                }
                flag if flag.starts_with("--") => return Err(format!("unknown argument: {flag}")),
                value => {
                    positional.push(value.to_string());
                    i += 1;
                }
            }
        }

        match positional.as_slice() {
            [module_path, version] => {
                parsed.module_path = module_path.clone();
                parsed.version = version.clone();
                Ok(parsed)
            }
            _ => Err("usage: fetch-queue task-id <MODULE> <VERSION> [OPTIONS]".to_string()),
        }
    }

    /// The id the task-service backend would use.
    pub fn task_id(&self, config: &QueueConfig) -> String {
        derive_task_id(
            &self.module_path,
            &self.version,
            self.at.unwrap_or_else(Utc::now),
            self.interval.unwrap_or_else(|| config.task_id_change_interval()),
        )
    }
}

/// Print the task id for a module version.
pub fn run_task_id(args: &TaskIdArgs) -> i32 {
    let config = match load_config(args.config_file.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return EXIT_CONFIG;
        }
    };
    println!("{}", args.task_id(&config));
    EXIT_OK
}

/// Schedule one fetch with the configured backend.
///
/// The in-process backend is drained before returning, so the fetch has run
/// (or been interrupted by Ctrl+C) when the command exits.
pub async fn run_schedule(args: &ScheduleArgs) -> i32 {
    let config = match load_config(args.config_file.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return EXIT_CONFIG;
        }
    };

    let base_url = args
        .processor_url
        .clone()
        .or_else(|| Some(config.tasks.target_url.clone()).filter(|u| !u.is_empty()))
        .unwrap_or_else(|| DEFAULT_PROCESSOR_URL.to_string());
    let processor = match HttpProcessor::new(&base_url, PROCESS_TIMEOUT) {
        Ok(p) => Arc::new(p.with_options(args.options.clone())),
        Err(e) => {
            eprintln!("Cannot build processor: {e}");
            return EXIT_FAILURE;
        }
    };

    let result = schedule(&config, processor, CancellationToken::new(), args).await;

    match result {
        Ok(true) => {
            println!("enqueued {}@{}", args.module_path, args.version);
            EXIT_OK
        }
        Ok(false) => {
            println!("{}@{} is already scheduled", args.module_path, args.version);
            EXIT_OK
        }
        Err(e) if e.is_config() => {
            eprintln!("Configuration error: {e}");
            EXIT_CONFIG
        }
        Err(e) => {
            eprintln!("Error: {e}");
            EXIT_FAILURE
        }
    }
}

/// Schedule through the configured backend. An in-process backend is
/// drained before returning; Ctrl+C cancels whatever has not started.
async fn schedule(
    config: &QueueConfig,
    processor: Arc<dyn ProcessFetch>,
    shutdown: CancellationToken,
    args: &ScheduleArgs,
) -> Result<bool, QueueError> {
    let experiments = StaticExperiments(config.experiments.clone());
    let backend = new_backend(
        config,
        config.workers,
        &experiments,
        processor,
        shutdown.clone(),
    )
    .await?;
    let admitted = backend
        .queue()
        .schedule_fetch(&args.module_path, &args.version, Some(&args.options))
        .await;

    if backend.is_in_process() {
        tokio::select! {
            () = backend.drain() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, cancelling pending fetches");
                shutdown.cancel();
                backend.drain().await;
            }
        }
    }
    admitted
}
