//! Span utilities for scheduling and processing.

use tracing::{info_span, Span};
use uuid::Uuid;

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for the spans the queue emits.
pub struct FetchSpan;

impl FetchSpan {
    /// Span around one `schedule_fetch` admission.
    ///
    /// `enqueued` and `task_name` are filled in by the backend.
    pub fn schedule(module_path: &str, version: &str) -> Span {
        info_span!(
            "schedule_fetch",
            module_path = %module_path,
            version = %version,
            task_name = tracing::field::Empty,
            enqueued = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }

    /// Span around one in-process processing run.
    pub fn process(run_id: Uuid, module_path: &str, version: &str) -> Span {
        info_span!(
            "process_fetch",
            run_id = %run_id,
            module_path = %module_path,
            version = %version,
            status_code = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
