//! Metric instrument factories.
//!
//! All instruments come from the `"pricewatcher"` meter on the global
//! `MeterProvider`, which is a no-op until telemetry installs a real one.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("pricewatcher")
}

/// Counter: queue operations.
/// Labels: `queue`, `operation`
/// ("create" | "submit" | "submit_duplicate" | "pop" | "pop_empty").
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("pricewatcher.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: watchers examined by a sweep.
/// Labels: `result` ("submitted" | "fresh" | "in_flight" | "failed").
pub fn sweep_watchers() -> Counter<u64> {
    meter()
        .u64_counter("pricewatcher.sweep.watchers")
        .with_description("Watchers examined by the scheduler, by outcome")
        .build()
}

/// Histogram: wall time of one sweep.
pub fn sweep_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("pricewatcher.sweep.duration_ms")
        .with_description("Scheduler sweep duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: writes to the watcher store.
/// Labels: `operation` ("create" | "update" | "remove").
pub fn watcher_changes() -> Counter<u64> {
    meter()
        .u64_counter("pricewatcher.watchers.changes")
        .with_description("Number of watcher store writes")
        .build()
}
