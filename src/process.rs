//! The processing-function seam.
//!
//! The in-process backend runs a [`ProcessFetch`] for every admitted module
//! version. What processing means (fetch, parse, store) is up to the
//! implementation; the queue only bounds, times and logs it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::experiment::ExperimentSet;
use crate::queue::options::{fetch_path, Options};

/// Errors returned by a processing function.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("processing failed with status {status}: {message}")]
    Failed { status: u16, message: String },

    #[error("processing transport: {0}")]
    Transport(String),

    #[error("processing cancelled")]
    Cancelled,
}

impl ProcessError {
    /// Status code to report alongside the error.
    pub fn status(&self) -> u16 {
        match self {
            Self::Failed { status, .. } => *status,
            Self::Transport(_) => 502,
            Self::Cancelled => 499,
        }
    }
}

/// Execution context handed to each processing call.
#[derive(Debug, Clone)]
pub struct FetchContext {
    run_id: Uuid,
    experiments: Arc<ExperimentSet>,
    cancel: CancellationToken,
    deadline: Instant,
}

impl FetchContext {
    pub fn new(
        experiments: Arc<ExperimentSet>,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            experiments,
            cancel,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Experiment flags captured when the queue was built.
    pub fn experiments(&self) -> &ExperimentSet {
        &self.experiments
    }

    pub fn is_active(&self, experiment: &str) -> bool {
        self.experiments.is_active(experiment)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the governing queue is shut down.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// A processing function for one module version.
#[async_trait]
pub trait ProcessFetch: Send + Sync {
    /// Process the module version, returning an HTTP-style status code.
    async fn process(
        &self,
        ctx: FetchContext,
        module_path: &str,
        version: &str,
    ) -> Result<u16, ProcessError>;
}

/// Adapter that lets a closure act as a [`ProcessFetch`].
pub struct FnProcessor<F>(F);

/// Wrap an async closure as a processing function.
pub fn process_fn<F, Fut>(f: F) -> FnProcessor<F>
where
    F: Fn(FetchContext, String, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<u16, ProcessError>> + Send,
{
    FnProcessor(f)
}

#[async_trait]
impl<F, Fut> ProcessFetch for FnProcessor<F>
where
    F: Fn(FetchContext, String, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<u16, ProcessError>> + Send,
{
    async fn process(
        &self,
        ctx: FetchContext,
        module_path: &str,
        version: &str,
    ) -> Result<u16, ProcessError> {
        (self.0)(ctx, module_path.to_string(), version.to_string()).await
    }
}

/// Forwards each fetch to a processing endpoint over HTTP.
///
/// Used when the in-process queue runs next to a separately hosted worker.
#[derive(Debug, Clone)]
pub struct HttpProcessor {
    client: reqwest::Client,
    base_url: String,
    options: Options,
}

impl HttpProcessor {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProcessError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProcessError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            options: Options::default(),
        })
    }

    /// Options forwarded on every request.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn url_for(&self, module_path: &str, version: &str) -> String {
        format!("{}{}", self.base_url, fetch_path(module_path, version, &self.options))
    }
}

#[async_trait]
impl ProcessFetch for HttpProcessor {
    async fn process(
        &self,
        ctx: FetchContext,
        module_path: &str,
        version: &str,
    ) -> Result<u16, ProcessError> {
        let url = self.url_for(module_path, version);
        tracing::debug!(run_id = %ctx.run_id(), %url, "forwarding fetch");

        let send = self.client.post(&url).send();
        let response = tokio::select! {
            () = ctx.cancelled() => return Err(ProcessError::Cancelled),
            r = send => r.map_err(|e| ProcessError::Transport(e.to_string()))?,
        };

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(status);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ProcessError::Failed { status, message })
    }
}
