//! fetch-queue
//!
//! Asynchronous scheduling of module-version fetches. A caller asks for
//! `module@version` to be fetched and gets back whether the request was
//! admitted; the fetch itself happens later, elsewhere.
//!
//! # Backends
//!
//! - **Task service**: every request becomes a named HTTP task. Identical
//!   requests inside one time window share a name, so the service drops the
//!   repeats.
//! - **In process**: a bounded FIFO feeding a fixed number of worker slots
//!   that run a caller-supplied [`ProcessFetch`].
//!
//! [`queue::new_queue`] chooses between them from [`config::QueueConfig`].

pub mod cli;
pub mod config;
pub mod experiment;
pub mod process;
pub mod queue;
pub mod telemetry;

pub use config::{ConfigError, Environment, QueueConfig, TasksConfig};
pub use experiment::{Experiment, ExperimentError, ExperimentGetter, ExperimentSet, StaticExperiments};
pub use process::{process_fn, FetchContext, HttpProcessor, ProcessError, ProcessFetch};
pub use queue::{
    derive_task_id, new_backend, new_queue, Backend, InMemoryConfig, InMemoryQueue, Options, Queue,
    QueueError, Source, TaskQueue, UNKNOWN_MODULE_PATH,
};
