//! Core data model.
//!
//! A task is one schedulable unit of work: it references a block, carries a
//! priority and creation time, and moves through a small lifecycle. Terminal
//! tasks stay in the queue file as history.

pub mod block;

pub use block::{BlockRecord, BlockStatus};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

// ---------------------------------------------------------------------------
// Task Record
// ---------------------------------------------------------------------------

/// A unit of work tracked in the queue file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique identifier.
    pub id: String,

    /// Current lifecycle state.
    pub status: TaskStatus,

    /// Priority. Higher = dequeued sooner.
    #[serde(default, deserialize_with = "whole_number::to_i64")]
    pub priority: i64,

    /// Creation time as written by the enqueuer. Kept verbatim so that
    /// unparsable values survive a load/save round trip.
    pub created_at: String,

    /// Block this task analyzes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,

    #[serde(default)]
    pub result_path: Option<String>,
    #[serde(default)]
    pub error_path: Option<String>,
    #[serde(default)]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,

    /// Fields this crate does not interpret. Preserved on save.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskRecord {
    /// A new pending task with priority 0, created now.
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            priority: 0,
            created_at: format_timestamp(Utc::now()),
            block_id: None,
            result_path: None,
            error_path: None,
            error_msg: None,
            completed_at: None,
            extra: Map::new(),
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = created_at.into();
        self
    }

    pub fn block(mut self, block_id: impl Into<String>) -> Self {
        self.block_id = Some(block_id.into());
        self
    }

    /// Does this record satisfy the terminal-outcome invariant?
    ///
    /// Terminal tasks carry exactly one of `result_path`/`error_path`;
    /// open tasks carry neither.
    pub fn outcome_consistent(&self) -> bool {
        match self.status {
            TaskStatus::Pending | TaskStatus::InProgress => {
                self.result_path.is_none() && self.error_path.is_none()
            }
            TaskStatus::Done => self.result_path.is_some() && self.error_path.is_none(),
            TaskStatus::Error => self.error_path.is_some() && self.result_path.is_none(),
        }
    }
}

/// Deserializers for integer fields.
///
/// JSON Schema counts `2.0` as an integer, so these accept any number with
/// a zero fraction. Serialization is unchanged.
pub(crate) mod whole_number {
    use serde::de::{Deserialize, Deserializer, Error};
    use serde_json::Number;

    fn whole<E: Error>(n: &Number) -> Result<i128, E> {
        if let Some(v) = n.as_i64() {
            return Ok(i128::from(v));
        }
        if let Some(v) = n.as_u64() {
            return Ok(i128::from(v));
        }
        match n.as_f64() {
            Some(f) if f.fract() == 0.0 => Ok(f as i128),
            _ => Err(E::custom(format!("expected an integer, got {n}"))),
        }
    }

    fn narrow<T: TryFrom<i128>, E: Error>(n: &Number) -> Result<T, E> {
        T::try_from(whole::<E>(n)?).map_err(|_| E::custom(format!("integer {n} out of range")))
    }

    pub fn to_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        narrow(&Number::deserialize(d)?)
    }

    pub fn to_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        narrow(&Number::deserialize(d)?)
    }

    pub fn to_opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Option::<Number>::deserialize(d)?
            .map(|n| narrow(&n))
            .transpose()
    }
}

/// Render a timestamp the way queue files store them: RFC 3339, whole
/// seconds, `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be picked up.
    Pending,
    /// Picked up by the orchestrator.
    InProgress,
    /// Finished with a result. Terminal.
    Done,
    /// Finished with an error. Terminal.
    Error,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Done,
        TaskStatus::Error,
    ];

    /// Can transition from self to `to`?
    ///
    /// Completion straight from `pending` is allowed: the orchestrator may
    /// fail a task before it ever starts (e.g. its block is unreadable).
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (Pending, Done)
                | (Pending, Error)
                | (InProgress, Done)
                | (InProgress, Error)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            "error" => Ok(TaskStatus::Error),
            _ => Err(Error::Other(format!("unknown task status: {s}"))),
        }
    }
}
