//! Metric instrument factories for tradewind-worker.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"tradewind-worker"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for tradewind-worker instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("tradewind-worker")
}

/// Counter: work items enqueued.
/// Labels: `work_type`.
pub fn work_added() -> Counter<u64> {
    meter()
        .u64_counter("tradewind.work.added")
        .with_description("Number of work items enqueued")
        .build()
}

/// Counter: allocation attempts.
/// Labels: `worker`, `result` ("ok" | "empty").
pub fn work_allocated() -> Counter<u64> {
    meter()
        .u64_counter("tradewind.work.allocated")
        .with_description("Number of work allocation attempts")
        .build()
}

/// Counter: recorded outcomes.
/// Labels: `work_type`, `result` ("success" | "failure").
pub fn work_finished() -> Counter<u64> {
    meter()
        .u64_counter("tradewind.work.finished")
        .with_description("Number of work items finished")
        .build()
}

/// Counter: retry clones spawned by failed items.
/// Labels: `work_type`.
pub fn work_retried() -> Counter<u64> {
    meter()
        .u64_counter("tradewind.work.retried")
        .with_description("Number of retry clones spawned")
        .build()
}

/// Counter: soft deletions.
/// Labels: `work_type`.
pub fn work_removed() -> Counter<u64> {
    meter()
        .u64_counter("tradewind.work.removed")
        .with_description("Number of work items soft-deleted")
        .build()
}

/// Histogram: allocation-to-finish duration in milliseconds.
/// Labels: `work_type`.
pub fn work_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("tradewind.work.duration_ms")
        .with_description("Work duration from allocation to finish")
        .with_unit("ms")
        .build()
}
