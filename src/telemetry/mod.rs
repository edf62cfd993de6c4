//! Telemetry for the fetch queue.
//!
//! Structured logging through `tracing`, standard spans for scheduling, and
//! counters through the `metrics` facade. Exporters are the embedder's choice.

mod logging;
mod metrics;
mod spans;

pub use self::logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_admission_error, record_duplicate, record_processed, record_scheduled, InFlightGuard,
    ProcessOutcome,
};
pub use self::spans::{FetchSpan, SpanExt};

#[cfg(test)]
pub(crate) use self::metrics::test_recorder;
