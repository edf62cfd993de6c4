//! Fetch scheduling.
//!
//! Callers ask for a module version to be fetched through [`Queue`]. Two
//! backends implement it: [`TaskQueue`] hands each request to the external
//! task service, [`InMemoryQueue`] runs it on a bounded local worker pool.
//! [`new_queue`] picks one from the configured environment.

mod error;
mod factory;
mod in_memory;
pub mod options;
pub mod task_client;
pub mod task_id;
mod tasks;
pub mod token;

use async_trait::async_trait;

pub use error::{QueueError, TaskServiceError};
pub use factory::{new_backend, new_queue, Backend};
pub use in_memory::{InMemoryConfig, InMemoryQueue, ModuleVersion, PROCESS_TIMEOUT};
pub use options::{fetch_path, Options, Source};
pub use task_client::{HttpRequest, HttpTaskClient, OidcToken, Task, TaskClient};
pub use task_id::{derive_task_id, escape_task_id_part};
pub use tasks::{TaskQueue, ADMISSION_TIMEOUT, MAX_DISPATCH_DEADLINE};
pub use token::{MetadataTokenSource, StaticTokenSource, TokenSource};

/// Module path placeholder used upstream when the real path is not known.
pub const UNKNOWN_MODULE_PATH: &str = "unknownModulePath";

/// Asynchronous fetch scheduling.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Ask for `module_path@version` to be fetched later.
    ///
    /// Returns `Ok(true)` when the request was admitted and `Ok(false)` when
    /// an identical request is already scheduled in the current window.
    async fn schedule_fetch(
        &self,
        module_path: &str,
        version: &str,
        opts: Option<&Options>,
    ) -> Result<bool, QueueError>;
}
