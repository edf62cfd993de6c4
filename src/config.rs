//! Queue configuration loading from environment variables and TOML files.
//!
//! Values come from an optional TOML file, then `FETCH_QUEUE_*` environment
//! variables on top. Invalid numeric values fall back to the current value
//! without crashing. Required distributed-backend settings are only checked
//! when that backend is built, by [`TasksConfig::validate`].
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `FETCH_QUEUE_ENV` | `local` | `managed` selects the task-service backend |
//! | `K_SERVICE` / `GAE_ENV` | unset | Presence implies `managed` |
//! | `GOOGLE_CLOUD_PROJECT` | "" | Task-service project |
//! | `FETCH_QUEUE_LOCATION` | "" | Task-service location |
//! | `FETCH_QUEUE_ID` | "" | Task-service queue id |
//! | `FETCH_QUEUE_TARGET_URL` | "" | Base URL of the processing endpoint |
//! | `FETCH_QUEUE_SERVICE_ACCOUNT` | "" | Service account for OIDC tokens |
//! | `FETCH_QUEUE_AUDIENCE` | "" | OIDC token audience |
//! | `FETCH_QUEUE_TASKS_ENDPOINT` | `https://cloudtasks.googleapis.com` | REST endpoint |
//! | `FETCH_QUEUE_WORKERS` | 10 | In-process worker count |
//! | `FETCH_QUEUE_INTAKE_CAPACITY` | 1000 | In-process pending capacity |
//! | `FETCH_QUEUE_TASK_ID_INTERVAL` | 10800 | Dedup window (secs, 0 = none) |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::experiment::Experiment;
use thiserror::Error;

pub const DEFAULT_TASKS_ENDPOINT: &str = "https://cloudtasks.googleapis.com";
pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_INTAKE_CAPACITY: usize = 1000;
pub const DEFAULT_TASK_ID_INTERVAL_SECS: u64 = 3 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid config file: {0}")]
    Parse(String),
    #[error("reading config file: {0}")]
    Io(String),
}

/// Where the process runs, which decides the queue backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local or test process: in-process worker pool.
    #[default]
    Local,
    /// Managed deployment: external task service.
    Managed,
}

impl Environment {
    pub fn is_managed(self) -> bool {
        self == Self::Managed
    }
}

/// Settings for the task-service backend. All fields are required there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    pub project: String,
    pub location: String,
    pub queue_id: String,
    /// Base URL the task service dispatches fetches to.
    pub target_url: String,
    pub service_account: String,
    pub audience: String,
    pub endpoint: String,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            location: String::new(),
            queue_id: String::new(),
            target_url: String::new(),
            service_account: String::new(),
            audience: String::new(),
            endpoint: DEFAULT_TASKS_ENDPOINT.to_string(),
        }
    }
}

impl TasksConfig {
    /// Fail on the first missing required setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("queue_id", &self.queue_id),
            ("project", &self.project),
            ("location", &self.location),
            ("target_url", &self.target_url),
            ("service_account", &self.service_account),
            ("audience", &self.audience),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        Ok(())
    }

    /// Fully qualified queue name, `projects/<p>/locations/<l>/queues/<q>`.
    pub fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project, self.location, self.queue_id
        )
    }
}

/// All queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub environment: Environment,
    pub tasks: TasksConfig,
    pub workers: usize,
    pub intake_capacity: usize,
    pub task_id_interval_secs: u64,
    /// Experiments the in-process backend snapshots at startup (`[[experiments]]`).
    pub experiments: Vec<Experiment>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Local,
            tasks: TasksConfig::default(),
            workers: DEFAULT_WORKERS,
            intake_capacity: DEFAULT_INTAKE_CAPACITY,
            task_id_interval_secs: DEFAULT_TASK_ID_INTERVAL_SECS,
            experiments: Vec::new(),
        }
    }
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub environment: Environment,
    pub queue_path: String,
    pub target_url: String,
    pub service_account: String,
    pub audience: String,
    pub tasks_endpoint: String,
    pub workers: usize,
    pub intake_capacity: usize,
    pub task_id_interval_secs: u64,
}

impl QueueConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(cfg.with_floors())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn task_id_change_interval(&self) -> Duration {
        Duration::from_secs(self.task_id_interval_secs)
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            environment: self.environment,
            queue_path: self.tasks.queue_path(),
            target_url: self.tasks.target_url.clone(),
            service_account: self.tasks.service_account.clone(),
            audience: self.tasks.audience.clone(),
            tasks_endpoint: self.tasks.endpoint.clone(),
            workers: self.workers,
            intake_capacity: self.intake_capacity,
            task_id_interval_secs: self.task_id_interval_secs,
        }
    }

    fn with_floors(mut self) -> Self {
        self.workers = self.workers.max(1);
        self.intake_capacity = self.intake_capacity.max(1);
        self
    }
}

/// Parse a `usize` env var, returning `current` on missing or invalid.
fn parse_usize(key: &str, current: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(current),
        Err(_) => current,
    }
}

/// Parse a `u64` env var, returning `current` on missing or invalid.
fn parse_u64(key: &str, current: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(current),
        Err(_) => current,
    }
}

/// Overwrite `target` with a non-empty env var.
fn override_string(key: &str, target: &mut String) {
    if let Ok(val) = std::env::var(key) {
        if !val.trim().is_empty() {
            *target = val;
        }
    }
}

fn detect_environment(current: Environment) -> Environment {
    match std::env::var("FETCH_QUEUE_ENV").as_deref() {
        Ok("managed") => return Environment::Managed,
        Ok("local") => return Environment::Local,
        _ => {}
    }
    let on_platform = ["K_SERVICE", "GAE_ENV"]
        .iter()
        .any(|k| std::env::var_os(k).is_some());
    if on_platform {
        Environment::Managed
    } else {
        current
    }
}

/// Apply environment overrides to `cfg`.
pub fn apply_env(mut cfg: QueueConfig) -> QueueConfig {
    cfg.environment = detect_environment(cfg.environment);
    override_string("GOOGLE_CLOUD_PROJECT", &mut cfg.tasks.project);
    override_string("FETCH_QUEUE_LOCATION", &mut cfg.tasks.location);
    override_string("FETCH_QUEUE_ID", &mut cfg.tasks.queue_id);
    override_string("FETCH_QUEUE_TARGET_URL", &mut cfg.tasks.target_url);
    override_string("FETCH_QUEUE_SERVICE_ACCOUNT", &mut cfg.tasks.service_account);
    override_string("FETCH_QUEUE_AUDIENCE", &mut cfg.tasks.audience);
    override_string("FETCH_QUEUE_TASKS_ENDPOINT", &mut cfg.tasks.endpoint);
    cfg.workers = parse_usize("FETCH_QUEUE_WORKERS", cfg.workers);
    cfg.intake_capacity = parse_usize("FETCH_QUEUE_INTAKE_CAPACITY", cfg.intake_capacity);
    cfg.task_id_interval_secs = parse_u64("FETCH_QUEUE_TASK_ID_INTERVAL", cfg.task_id_interval_secs);
    cfg.with_floors()
}

/// Load configuration from environment variables over the defaults.
pub fn load() -> QueueConfig {
    apply_env(QueueConfig::default())
}

/// Load a TOML file, then apply environment overrides.
pub fn load_with_file(path: &Path) -> Result<QueueConfig, ConfigError> {
    Ok(apply_env(QueueConfig::from_file(path)?))
}
