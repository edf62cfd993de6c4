//! Subcommands of the `fetch-queue` binary.
//!
//! ```bash
//! fetch-queue schedule golang.org/x/net v0.1.0          # admit one fetch
//! fetch-queue schedule golang.org/x/net v0.1.0 --frontend --suffix retry
//! fetch-queue task-id golang.org/x/net v0.1.0           # print the task id
//! fetch-queue config show                               # effective config
//! ```

pub mod config_cmd;
pub mod schedule_cmd;

use std::path::PathBuf;

pub use schedule_cmd::{run_schedule, run_task_id, ScheduleArgs, TaskIdArgs};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// Processing endpoint used by the in-process backend when none is configured.
pub const DEFAULT_PROCESSOR_URL: &str = "http://localhost:8080";

/// Value following the flag at `args[i]`.
fn flag_value<'a>(args: &'a [String], i: usize) -> Result<&'a str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("missing value for {}", args[i]))
}

/// Load the config file if one was named, then apply the environment.
fn load_config(file: Option<&PathBuf>) -> Result<crate::config::QueueConfig, crate::config::ConfigError> {
    match file {
        Some(path) => crate::config::load_with_file(path),
        None => Ok(crate::config::load()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flag_value_reads_next_argument() {
        let a = args(&["--suffix", "x"]);
        assert_eq!(flag_value(&a, 0).unwrap(), "x");
    }

    #[test]
    fn flag_value_reports_missing() {
        let a = args(&["--suffix"]);
        assert_eq!(flag_value(&a, 0).unwrap_err(), "missing value for --suffix");
    }

    #[test]
    fn missing_config_file_is_io_error() {
        let path = PathBuf::from("/nonexistent/fetch-queue.toml");
        assert!(matches!(
            load_config(Some(&path)),
            Err(crate::config::ConfigError::Io(_))
        ));
    }
}
