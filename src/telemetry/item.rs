//! Work item span helpers.
//!
//! Provides span creation and outcome recording for capture files flowing
//! through the worker pool.

use std::path::Path;
use tracing::Span;
use uuid::Uuid;

/// Start a span for processing one capture file.
///
/// The `item.outcome` field is declared empty and filled in via
/// [`record_outcome`].
pub fn start_item_span(backend: &str, worker: usize, invocation: &Uuid, path: &Path) -> Span {
    tracing::info_span!(
        "item.process",
        "item.backend" = backend,
        "item.worker" = worker,
        "item.invocation" = %invocation,
        "item.path" = %path.display(),
        "item.outcome" = tracing::field::Empty,
    )
}

/// Record the final outcome on the item span.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("item.outcome", outcome);
    span.in_scope(|| {
        tracing::debug!(outcome = outcome, "item finished");
    });
}
