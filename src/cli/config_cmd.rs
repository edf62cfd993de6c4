//! Config subcommands: show, defaults, validate.
//!
//! These read the environment (and an optional TOML file) directly; nothing
//! is contacted.

use std::path::PathBuf;

use super::{load_config, EXIT_CONFIG, EXIT_FAILURE, EXIT_OK};
use crate::config::{
    EffectiveConfig, QueueConfig, DEFAULT_INTAKE_CAPACITY, DEFAULT_TASKS_ENDPOINT,
    DEFAULT_TASK_ID_INTERVAL_SECS, DEFAULT_WORKERS,
};

/// Print the effective config, as `KEY=value` lines or one JSON object.
pub fn run_show(file: Option<&PathBuf>, json: bool) -> i32 {
    let cfg = match load_config(file) {
        Ok(c) => c.effective_config(),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return EXIT_CONFIG;
        }
    };
    if json {
        match serde_json::to_string_pretty(&cfg) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Cannot encode config: {e}");
                return EXIT_FAILURE;
            }
        }
    } else {
        print!("{}", render_config(&cfg));
    }
    EXIT_OK
}

/// Print default values (no env overrides).
pub fn run_defaults() {
    println!("FETCH_QUEUE_ENV=local");
    println!("FETCH_QUEUE_TASKS_ENDPOINT={DEFAULT_TASKS_ENDPOINT}");
    println!("FETCH_QUEUE_WORKERS={DEFAULT_WORKERS}");
    println!("FETCH_QUEUE_INTAKE_CAPACITY={DEFAULT_INTAKE_CAPACITY}");
    println!("FETCH_QUEUE_TASK_ID_INTERVAL={DEFAULT_TASK_ID_INTERVAL_SECS}");
}

/// Validate the configuration for the selected backend.
///
/// Returns 0 if valid, 2 if the task-service settings are incomplete, 1 if
/// only warnings were found.
pub fn run_validate(file: Option<&PathBuf>) -> i32 {
    let cfg = match load_config(file) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return EXIT_CONFIG;
        }
    };
    if cfg.environment.is_managed() {
        if let Err(e) = cfg.tasks.validate() {
            eprintln!("ERROR: {e}");
            return EXIT_CONFIG;
        }
    }

    let warnings = warnings(&cfg);
    for w in &warnings {
        eprintln!("WARNING: {w}");
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}

fn warnings(cfg: &QueueConfig) -> Vec<String> {
    let mut out = Vec::new();
    if cfg.environment.is_managed() && cfg.task_id_interval_secs == 0 {
        out.push(
            "FETCH_QUEUE_TASK_ID_INTERVAL is 0; every schedule gets a fresh task id".to_string(),
        );
    }
    if cfg.environment.is_managed() && !cfg.tasks.target_url.starts_with("https://") {
        out.push(format!(
            "FETCH_QUEUE_TARGET_URL {:?} is not https; OIDC tokens require it",
            cfg.tasks.target_url
        ));
    }
    if !cfg.environment.is_managed() && cfg.intake_capacity < cfg.workers {
        out.push(format!(
            "FETCH_QUEUE_INTAKE_CAPACITY ({}) < FETCH_QUEUE_WORKERS ({})",
            cfg.intake_capacity, cfg.workers
        ));
    }
    out
}

fn render_config(cfg: &EffectiveConfig) -> String {
    let environment = if cfg.environment.is_managed() { "managed" } else { "local" };
    format!(
        "FETCH_QUEUE_ENV={environment}\n\
         FETCH_QUEUE_QUEUE_PATH={}\n\
         FETCH_QUEUE_TARGET_URL={}\n\
         FETCH_QUEUE_SERVICE_ACCOUNT={}\n\
         FETCH_QUEUE_AUDIENCE={}\n\
         FETCH_QUEUE_TASKS_ENDPOINT={}\n\
         FETCH_QUEUE_WORKERS={}\n\
         FETCH_QUEUE_INTAKE_CAPACITY={}\n\
         FETCH_QUEUE_TASK_ID_INTERVAL={}\n",
        cfg.queue_path,
        cfg.target_url,
        cfg.service_account,
        cfg.audience,
        cfg.tasks_endpoint,
        cfg.workers,
        cfg.intake_capacity,
        cfg.task_id_interval_secs,
    )
}
