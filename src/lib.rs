//! # blockq
//!
//! Durable work tracking for a block-analysis pipeline.
//!
//! Validates incoming block records (schema plus integrity rules), keeps a
//! JSON Lines task queue with an atomic save, drives each task through a
//! small lifecycle, and writes analysis results and errors exactly once per
//! block.

pub mod charset;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod schema;
pub mod sink;
pub mod storage;
pub mod telemetry;
pub mod validate;

pub use error::{Error, Result};
pub use lifecycle::Transition;
pub use model::{BlockRecord, BlockStatus, TaskRecord, TaskStatus};
pub use sink::{ErrorSink, ResultSink};
pub use storage::{QueueStore, select_pending};
pub use validate::{RecordValidator, Rule, ValidationReport};
