//! Backend selection.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::error::QueueError;
use super::in_memory::{InMemoryConfig, InMemoryQueue};
use super::task_client::HttpTaskClient;
use super::tasks::{TaskQueue, ADMISSION_TIMEOUT};
use super::token::MetadataTokenSource;
use super::Queue;
use crate::config::{ConfigError, QueueConfig};
use crate::experiment::{ExperimentGetter, ExperimentSet};
use crate::process::ProcessFetch;

/// The backend [`new_backend`] picked, with its concrete type kept.
pub enum Backend {
    Tasks(Arc<TaskQueue>),
    InMemory(Arc<InMemoryQueue>),
}

impl Backend {
    pub fn queue(&self) -> Arc<dyn Queue> {
        match self {
            Self::Tasks(q) => Arc::clone(q) as Arc<dyn Queue>,
            Self::InMemory(q) => Arc::clone(q) as Arc<dyn Queue>,
        }
    }

    pub fn is_in_process(&self) -> bool {
        matches!(self, Self::InMemory(_))
    }

    /// Wait for in-process work to finish. The task service owns its tasks,
    /// so this returns at once for [`Backend::Tasks`].
    pub async fn drain(&self) {
        if let Self::InMemory(q) = self {
            q.drain().await;
        }
    }
}

/// Build the queue for the configured environment.
///
/// A managed environment gets a [`TaskQueue`]; `workers`, `getter` and
/// `processor` are unused there since the task service delivers fetches to
/// `tasks.target_url`. Anywhere else the experiments are read once and an
/// [`InMemoryQueue`] with `workers` slots is started under `shutdown`.
pub async fn new_queue(
    config: &QueueConfig,
    workers: usize,
    getter: &dyn ExperimentGetter,
    processor: Arc<dyn ProcessFetch>,
    shutdown: CancellationToken,
) -> Result<Arc<dyn Queue>, QueueError> {
    let backend = new_backend(config, workers, getter, processor, shutdown).await?;
    Ok(backend.queue())
}

/// Same selection as [`new_queue`], for callers that need to drain.
pub async fn new_backend(
    config: &QueueConfig,
    workers: usize,
    getter: &dyn ExperimentGetter,
    processor: Arc<dyn ProcessFetch>,
    shutdown: CancellationToken,
) -> Result<Backend, QueueError> {
    if config.environment.is_managed() {
        config.tasks.validate()?;
        let http = reqwest::Client::builder()
            .timeout(ADMISSION_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Parse(format!("http client: {e}")))?;
        let tokens = Arc::new(MetadataTokenSource::new(http.clone()));
        let client = HttpTaskClient::new(http, &config.tasks.endpoint, tokens);
        let queue = TaskQueue::new(
            Arc::new(client),
            config.tasks.clone(),
            config.task_id_change_interval(),
        )?;
        tracing::info!(queue = queue.queue_path(), "using task-service queue");
        return Ok(Backend::Tasks(Arc::new(queue)));
    }

    let experiments = ExperimentSet::snapshot(getter).await?;
    let sizing = InMemoryConfig {
        workers,
        intake_capacity: config.intake_capacity,
        ..Default::default()
    };
    tracing::info!(
        workers = sizing.workers,
        experiments = experiments.len(),
        "using in-process queue"
    );
    Ok(Backend::InMemory(Arc::new(InMemoryQueue::new(
        sizing,
        processor,
        experiments,
        shutdown,
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, TasksConfig};
    use crate::experiment::{Experiment, ExperimentError, StaticExperiments};
    use crate::process::{process_fn, ProcessError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingGetter;

    #[async_trait]
    impl ExperimentGetter for FailingGetter {
        async fn experiments(&self) -> Result<Vec<Experiment>, ExperimentError> {
            Err(ExperimentError("store offline".into()))
        }
    }

    fn counting() -> (Arc<AtomicUsize>, Arc<dyn ProcessFetch>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let processor = process_fn(move |_ctx, _m, _v| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok::<u16, ProcessError>(200)
            }
        });
        (calls, Arc::new(processor))
    }

    #[tokio::test]
    async fn local_environment_runs_in_process() {
        let (calls, processor) = counting();
        let getter = StaticExperiments(vec![Experiment::new("a", 1)]);
        let shutdown = CancellationToken::new();
        let q = new_queue(&QueueConfig::default(), 2, &getter, processor, shutdown.clone())
            .await
            .unwrap();

        assert!(q.schedule_fetch("m", "v1", None).await.unwrap());
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while calls.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        shutdown.cancel();
    }

    #[tokio::test]
    async fn local_backend_drains_with_snapshot() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let processor = process_fn(move |ctx, _m, _v| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(ctx.is_active("fast-fetch"));
                Ok::<u16, ProcessError>(200)
            }
        });
        let getter = StaticExperiments(vec![Experiment::new("fast-fetch", 10)]);
        let backend = new_backend(
            &QueueConfig::default(),
            1,
            &getter,
            Arc::new(processor),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(backend.is_in_process());

        assert!(backend.queue().schedule_fetch("m", "v1", None).await.unwrap());
        backend.drain().await;
        assert_eq!(*seen.lock(), vec![true]);
    }

    #[tokio::test]
    async fn experiment_failure_is_returned() {
        let (_calls, processor) = counting();
        let err = new_queue(
            &QueueConfig::default(),
            1,
            &FailingGetter,
            processor,
            CancellationToken::new(),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, QueueError::Experiments(_)));
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn managed_environment_requires_task_settings() {
        let (_calls, processor) = counting();
        let config = QueueConfig {
            environment: Environment::Managed,
            ..Default::default()
        };
        let err = new_queue(
            &config,
            1,
            &StaticExperiments::default(),
            processor,
            CancellationToken::new(),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, QueueError::Config(ConfigError::Missing(_))));
    }

    #[tokio::test]
    async fn managed_environment_builds_without_touching_experiments() {
        let (calls, processor) = counting();
        let config = QueueConfig {
            environment: Environment::Managed,
            tasks: TasksConfig {
                project: "p".into(),
                location: "l".into(),
                queue_id: "q".into(),
                target_url: "https://worker".into(),
                service_account: "sa@p.iam.gserviceaccount.com".into(),
                audience: "https://worker".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(new_queue(&config, 1, &FailingGetter, processor, CancellationToken::new())
            .await
            .is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
