//! Queue counters through the `metrics` facade.

use metrics::{counter, gauge};

/// How a processing run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Ok,
    Failed,
    TimedOut,
}

impl ProcessOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::TimedOut => "timeout",
        }
    }
}

/// A fetch was admitted by `backend`.
pub fn record_scheduled(backend: &'static str) {
    counter!("fetch_queue_scheduled_total", "backend" => backend).increment(1);
}

/// The task service already had a task with the derived name.
pub fn record_duplicate() {
    counter!("fetch_queue_duplicates_total").increment(1);
}

pub fn record_admission_error() {
    counter!("fetch_queue_admission_errors_total").increment(1);
}

pub fn record_processed(outcome: ProcessOutcome, latency_ms: u64) {
    counter!("fetch_queue_processed_total", "outcome" => outcome.as_str()).increment(1);
    metrics::histogram!("fetch_queue_process_latency_ms").record(latency_ms as f64);
}

const IN_FLIGHT: &str = "fetch_queue_in_flight";

/// Holds `fetch_queue_in_flight` one higher for as long as it lives.
#[must_use]
pub struct InFlightGuard(());

impl InFlightGuard {
    pub fn start() -> Self {
        gauge!(IN_FLIGHT).increment(1.0);
        Self(())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT).decrement(1.0);
    }
}
