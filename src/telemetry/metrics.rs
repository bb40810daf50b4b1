//! OTel instruments for queue operations.
//!
//! Instruments come from the global `MeterProvider`; without one installed
//! they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("spiderq")
}

/// Counter: completed queue operations.
/// Labels: `kind` ("fifo" | "lifo" | "priority"), `operation`
/// ("push" | "pop" | "pop_empty" | "clear").
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("spiderq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: priority pops whose index entry had no payload.
/// Labels: `queue`.
pub fn payload_missing() -> Counter<u64> {
    meter()
        .u64_counter("spiderq.queue.payload_missing")
        .with_description("Index entries popped without a stored payload")
        .build()
}

/// Histogram: CLI command duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("spiderq.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
