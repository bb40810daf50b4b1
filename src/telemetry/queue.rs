//! Span helpers for queue commands.

use tracing::Span;

/// Span around one command against a spider's queue.
///
/// `queue.items` starts empty; fill it with [`record_items`].
pub fn start_queue_span(kind: &str, spider: &str, operation: &str) -> Span {
    tracing::info_span!(
        "queue.command",
        "queue.kind" = kind,
        "queue.spider" = spider,
        "queue.operation" = operation,
        "queue.items" = tracing::field::Empty,
    )
}

/// Record how many requests the command moved.
pub fn record_items(span: &Span, items: u64) {
    span.record("queue.items", items);
}
