//! Task-service backend.
//!
//! Each `schedule_fetch` becomes one `tasks.create` call. Dedup is the
//! service's: a task name that exists (or recently existed) is rejected, and
//! that rejection is reported to the caller as "not enqueued".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::Instrument;

use super::error::{QueueError, TaskServiceError};
use super::options::{fetch_path, Options};
use super::task_client::{HttpRequest, OidcToken, Task, TaskClient};
use super::task_id::derive_task_id;
use super::{Queue, UNKNOWN_MODULE_PATH};
use crate::config::TasksConfig;
use crate::telemetry::{self, FetchSpan, SpanExt};

/// Ceiling on the `tasks.create` call itself.
pub const ADMISSION_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest the service waits on an HTTP-dispatched task.
pub const MAX_DISPATCH_DEADLINE: Duration = Duration::from_secs(30 * 60);

const BACKEND: &str = "tasks";

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Queue backed by the external task service.
pub struct TaskQueue {
    client: Arc<dyn TaskClient>,
    config: TasksConfig,
    queue_path: String,
    change_interval: Duration,
    clock: Clock,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("queue_path", &self.queue_path)
            .field("target_url", &self.config.target_url)
            .field("change_interval", &self.change_interval)
            .finish()
    }
}

impl TaskQueue {
    /// Build the backend. Every [`TasksConfig`] field is required.
    pub fn new(
        client: Arc<dyn TaskClient>,
        config: TasksConfig,
        change_interval: Duration,
    ) -> Result<Self, QueueError> {
        config.validate()?;
        let queue_path = config.queue_path();
        Ok(Self {
            client,
            config,
            queue_path,
            change_interval,
            clock: Arc::new(Utc::now),
        })
    }

    /// Replace the wall clock used for task identities.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn queue_path(&self) -> &str {
        &self.queue_path
    }

    /// The task that `schedule_fetch` would submit at `now`.
    pub fn build_task(
        &self,
        module_path: &str,
        version: &str,
        opts: &Options,
        now: DateTime<Utc>,
    ) -> Task {
        let url = format!(
            "{}{}",
            self.config.target_url.trim_end_matches('/'),
            fetch_path(module_path, version, opts)
        );

        let mut name = format!(
            "{}/tasks/{}",
            self.queue_path,
            derive_task_id(module_path, version, now, self.change_interval)
        );
        if !opts.suffix.is_empty() {
            name.push('-');
            name.push_str(&opts.suffix);
        }

        Task {
            name,
            http_request: HttpRequest {
                http_method: "POST".to_string(),
                url,
                oidc_token: Some(OidcToken {
                    service_account_email: self.config.service_account.clone(),
                    audience: self.config.audience.clone(),
                }),
            },
            dispatch_deadline: MAX_DISPATCH_DEADLINE,
        }
    }

    async fn submit(&self, task: &Task) -> Result<(), TaskServiceError> {
        let create = self.client.create_task(&self.queue_path, task);
        match tokio::time::timeout(ADMISSION_TIMEOUT, create).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(TaskServiceError::Timeout(ADMISSION_TIMEOUT)),
        }
    }
}

#[async_trait]
impl Queue for TaskQueue {
    async fn schedule_fetch(
        &self,
        module_path: &str,
        version: &str,
        opts: Option<&Options>,
    ) -> Result<bool, QueueError> {
        if module_path == UNKNOWN_MODULE_PATH {
            return Err(QueueError::UnknownModulePath);
        }
        let default_opts = Options::default();
        let opts = opts.unwrap_or(&default_opts);
        let task = self.build_task(module_path, version, opts, (self.clock)());

        let span = FetchSpan::schedule(module_path, version);
        span.record("task_name", task.name.as_str());

        let result = self.submit(&task).instrument(span.clone()).await;
        let outcome = match result {
            Ok(()) => {
                tracing::info!(parent: &span, task = %task.name, "enqueued fetch");
                telemetry::record_scheduled(BACKEND);
                Ok(true)
            }
            Err(TaskServiceError::AlreadyExists) => {
                tracing::debug!(parent: &span, task = %task.name, "fetch already scheduled");
                telemetry::record_duplicate();
                Ok(false)
            }
            Err(source) => {
                tracing::warn!(parent: &span, error = %source, "task creation failed");
                telemetry::record_admission_error();
                Err(QueueError::Admission {
                    module_path: module_path.to_string(),
                    version: version.to_string(),
                    suffix: opts.suffix.clone(),
                    source,
                })
            }
        };
        if let Ok(enqueued) = &outcome {
            span.record("enqueued", *enqueued);
        }
        span.record_result(&outcome);
        outcome
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
