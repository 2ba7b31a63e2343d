//! Task lifecycle transitions.
//!
//! `pending -> in_progress -> {done | error}`. Transitions never fail:
//! redundant calls are no-ops and illegal ones are rejected without
//! touching the task. Both are logged and reported through the returned
//! [`Transition`], so orchestration code can call these unconditionally.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::model::{TaskRecord, TaskStatus, format_timestamp};
use crate::storage::find_mut;
use crate::telemetry::task::record_state_transition;

/// What a transition call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The task moved.
    Applied { from: TaskStatus, to: TaskStatus },
    /// The task was already in the requested state.
    Unchanged(TaskStatus),
    /// The task is terminal in the other outcome, or terminal at all for
    /// `start`.
    Rejected {
        current: TaskStatus,
        requested: TaskStatus,
    },
    /// No task with this id.
    NotFound(String),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// Gate a move to `to`, logging redundant and illegal requests.
fn check(task: &TaskRecord, to: TaskStatus) -> Option<Transition> {
    let from = task.status;
    if from == to {
        info!(task_id = %task.id, status = %from, "task is already {from} (no change)");
        return Some(Transition::Unchanged(from));
    }
    if !from.can_transition_to(to) {
        error!(task_id = %task.id, from = %from, to = %to, "cannot mark task as {to} (already {from})");
        return Some(Transition::Rejected {
            current: from,
            requested: to,
        });
    }
    None
}

fn applied(task: &TaskRecord, from: TaskStatus) -> Transition {
    record_state_transition(&tracing::Span::current(), &task.id, from.as_str(), task.status.as_str());
    Transition::Applied {
        from,
        to: task.status,
    }
}

/// Mark a task as picked up.
pub fn start(task: &mut TaskRecord) -> Transition {
    if let Some(outcome) = check(task, TaskStatus::InProgress) {
        return outcome;
    }
    let from = task.status;
    task.status = TaskStatus::InProgress;
    applied(task, from)
}

/// Mark a task done with its result. Clears any error fields.
pub fn complete(
    task: &mut TaskRecord,
    result_path: impl Into<String>,
    completed_at: DateTime<Utc>,
) -> Transition {
    if let Some(outcome) = check(task, TaskStatus::Done) {
        return outcome;
    }
    let from = task.status;
    task.status = TaskStatus::Done;
    task.result_path = Some(result_path.into());
    task.completed_at = Some(format_timestamp(completed_at));
    task.error_path = None;
    task.error_msg = None;
    applied(task, from)
}

/// Mark a task failed with its error. Clears any result path.
pub fn fail(
    task: &mut TaskRecord,
    error_msg: impl Into<String>,
    error_path: impl Into<String>,
    completed_at: DateTime<Utc>,
) -> Transition {
    if let Some(outcome) = check(task, TaskStatus::Error) {
        return outcome;
    }
    let from = task.status;
    task.status = TaskStatus::Error;
    task.error_msg = Some(error_msg.into());
    task.error_path = Some(error_path.into());
    task.completed_at = Some(format_timestamp(completed_at));
    task.result_path = None;
    applied(task, from)
}

fn not_found(op: &str, id: &str) -> Transition {
    error!(task_id = id, op, "task not found");
    Transition::NotFound(id.to_string())
}

/// [`start`] the task with `id`.
pub fn start_by_id(tasks: &mut [TaskRecord], id: &str) -> Transition {
    match find_mut(tasks, id) {
        Some(task) => start(task),
        None => not_found("start", id),
    }
}

/// [`complete`] the task with `id`.
pub fn complete_by_id(
    tasks: &mut [TaskRecord],
    id: &str,
    result_path: impl Into<String>,
    completed_at: DateTime<Utc>,
) -> Transition {
    match find_mut(tasks, id) {
        Some(task) => complete(task, result_path, completed_at),
        None => not_found("complete", id),
    }
}

/// [`fail`] the task with `id`.
pub fn fail_by_id(
    tasks: &mut [TaskRecord],
    id: &str,
    error_msg: impl Into<String>,
    error_path: impl Into<String>,
    completed_at: DateTime<Utc>,
) -> Transition {
    match find_mut(tasks, id) {
        Some(task) => fail(task, error_msg, error_path, completed_at),
        None => not_found("fail", id),
    }
}
