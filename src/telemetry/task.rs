//! Task span helpers.
//!
//! Provides span creation and state-transition recording for tasks moving
//! through the lifecycle.

use tracing::Span;

/// Start a span for an operation on one task.
///
/// The `task.status` field is declared empty and is filled in by
/// [`record_state_transition`].
pub fn start_task_span(op: &str, task_id: &str) -> Span {
    tracing::info_span!(
        "task",
        "task.op" = op,
        "task.id" = task_id,
        "task.status" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
pub fn record_state_transition(span: &Span, task_id: &str, from: &str, to: &str) {
    span.record("task.status", to);
    span.in_scope(|| {
        tracing::info!(task_id, from, to, "state_transition");
    });
}
