//! In-process backend: bounded intake plus a semaphore-limited worker pool.
//!
//! One dispatch loop takes pending module versions in FIFO order, waits for a
//! worker slot, and spawns the processing run. Runs hold their slot until they
//! finish, so at most `workers` run at once. Failures are logged and dropped;
//! the caller was already told the fetch was enqueued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::error::QueueError;
use super::options::Options;
use super::Queue;
use crate::experiment::ExperimentSet;
use crate::process::{FetchContext, ProcessFetch};
use crate::telemetry::{self, FetchSpan, InFlightGuard, ProcessOutcome, SpanExt};

/// Pending module versions held before callers block.
pub const DEFAULT_INTAKE_CAPACITY: usize = 1000;
/// Ceiling on a single processing run.
pub const PROCESS_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const BACKEND: &str = "in_memory";

/// A module version waiting for a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleVersion {
    pub module_path: String,
    pub version: String,
}

/// Sizing for [`InMemoryQueue`].
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    pub workers: usize,
    pub intake_capacity: usize,
    pub process_timeout: Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            intake_capacity: DEFAULT_INTAKE_CAPACITY,
            process_timeout: PROCESS_TIMEOUT,
        }
    }
}

impl InMemoryConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }
}

/// Queue that runs the processing function in this process.
pub struct InMemoryQueue {
    intake: Mutex<Option<mpsc::Sender<ModuleVersion>>>,
    slots: Arc<Semaphore>,
    workers: usize,
    experiments: Arc<ExperimentSet>,
    shutdown: CancellationToken,
    /// Cancelled once the dispatch loop has exited, however it exits.
    stopped: CancellationToken,
}

impl std::fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQueue")
            .field("workers", &self.workers)
            .field("in_flight", &self.in_flight())
            .field("experiments", &self.experiments.len())
            .finish()
    }
}

impl InMemoryQueue {
    /// Start the dispatch loop. Must be called inside a Tokio runtime.
    ///
    /// `shutdown` governs the loop and is the parent of every run's
    /// cancellation token.
    pub fn new(
        config: InMemoryConfig,
        processor: Arc<dyn ProcessFetch>,
        experiments: Arc<ExperimentSet>,
        shutdown: CancellationToken,
    ) -> Self {
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel(config.intake_capacity.max(1));
        let slots = Arc::new(Semaphore::new(workers));
        let stopped = CancellationToken::new();

        let dispatcher = Dispatcher {
            slots: Arc::clone(&slots),
            processor,
            experiments: Arc::clone(&experiments),
            shutdown: shutdown.clone(),
            process_timeout: config.process_timeout,
            stopped: stopped.clone(),
        };
        tokio::spawn(dispatcher.run(rx));

        Self {
            intake: Mutex::new(Some(tx)),
            slots,
            workers,
            experiments,
            shutdown,
            stopped,
        }
    }

    /// Runs currently holding a worker slot.
    pub fn in_flight(&self) -> usize {
        self.workers - self.slots.available_permits()
    }

    /// Module versions waiting in the intake buffer.
    pub fn pending(&self) -> usize {
        self.intake
            .lock()
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    pub fn experiments(&self) -> &ExperimentSet {
        &self.experiments
    }

    /// Process everything already scheduled, then stop.
    ///
    /// Closes the intake, waits for the dispatch loop to hand out every
    /// pending module version and exit, then takes every worker slot so no
    /// run is still going when this returns. Later `schedule_fetch` calls
    /// fail with [`QueueError::Closed`]. Safe to call from several tasks at
    /// once, or again after an earlier `drain` future was dropped.
    pub async fn drain(&self) {
        drop(self.intake.lock().take());
        self.stopped.cancelled().await;

        let all = u32::try_from(self.workers).unwrap_or(u32::MAX);
        match self.slots.acquire_many(all).await {
            Ok(permits) => drop(permits),
            Err(_) => tracing::warn!("worker slots closed during drain"),
        }
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn schedule_fetch(
        &self,
        module_path: &str,
        version: &str,
        _opts: Option<&Options>,
    ) -> Result<bool, QueueError> {
        let tx = self.intake.lock().clone().ok_or(QueueError::Closed)?;
        let item = ModuleVersion {
            module_path: module_path.to_string(),
            version: version.to_string(),
        };

        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(QueueError::Closed),
            sent = tx.send(item) => sent.map_err(|_| QueueError::Closed)?,
        }

        tracing::info!(module_path, version, "enqueued fetch");
        telemetry::record_scheduled(BACKEND);
        Ok(true)
    }
}

/// State owned by the dispatch loop.
struct Dispatcher {
    slots: Arc<Semaphore>,
    processor: Arc<dyn ProcessFetch>,
    experiments: Arc<ExperimentSet>,
    shutdown: CancellationToken,
    process_timeout: Duration,
    stopped: CancellationToken,
}

impl Dispatcher {
    async fn run(self, mut rx: mpsc::Receiver<ModuleVersion>) {
        let _stopped = self.stopped.clone().drop_guard();
        loop {
            let item = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let permit = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let ctx = FetchContext::new(
                Arc::clone(&self.experiments),
                self.shutdown.child_token(),
                self.process_timeout,
            );
            tokio::spawn(run_fetch(
                permit,
                Arc::clone(&self.processor),
                ctx,
                item,
                self.process_timeout,
            ));
        }
        tracing::debug!(cancelled = self.shutdown.is_cancelled(), "fetch dispatcher stopped");
    }
}

/// One processing run. The permit is released when this returns or unwinds.
async fn run_fetch(
    permit: OwnedSemaphorePermit,
    processor: Arc<dyn ProcessFetch>,
    ctx: FetchContext,
    item: ModuleVersion,
    timeout: Duration,
) {
    let _permit = permit;
    let _in_flight = InFlightGuard::start();
    let span = FetchSpan::process(ctx.run_id(), &item.module_path, &item.version);
    let start = std::time::Instant::now();

    let call = processor.process(ctx, &item.module_path, &item.version);
    let result = tokio::time::timeout(timeout, call).instrument(span.clone()).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    span.record("latency_ms", latency_ms);

    let outcome = match result {
        Ok(Ok(status)) => {
            span.record("status_code", status);
            span.record_result::<_, String>(&Ok(()));
            tracing::info!(parent: &span, status, "processed fetch");
            ProcessOutcome::Ok
        }
        Ok(Err(e)) => {
            span.record("status_code", e.status());
            span.record_result::<(), _>(&Err(&e));
            tracing::error!(parent: &span, status = e.status(), error = %e, "processing failed");
            ProcessOutcome::Failed
        }
        Err(_) => {
            span.record_result::<(), _>(&Err("timed out"));
            tracing::error!(parent: &span, ?timeout, "processing timed out");
            ProcessOutcome::TimedOut
        }
    };
    telemetry::record_processed(outcome, latency_ms);
}

#[cfg(test)]
#[path = "in_memory_tests.rs"]
mod tests;
