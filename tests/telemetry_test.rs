//! Integration tests for logging initialization and span helpers.

use std::sync::Mutex;

use blockq::lifecycle;
use blockq::model::TaskRecord;
use blockq::telemetry::rotate::RotatingFile;
use blockq::telemetry::task::{record_state_transition, start_task_span};
use blockq::telemetry::{LogConfig, LogFile, LogLevel, init_logging, reset_logging, set_level};

// The subscriber is process-wide; tests that retarget it run one at a time.
static LOGGING: Mutex<()> = Mutex::new(());

fn file_config(path: &std::path::Path, level: LogLevel) -> LogConfig {
    LogConfig {
        level,
        file: Some(LogFile::new(path)),
    }
}

#[test]
fn logging_writes_to_the_configured_file() {
    let _lock = LOGGING.lock().unwrap_or_else(|p| p.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Logs").join("operator.log");

    let guard = init_logging(file_config(&path, LogLevel::Info)).unwrap();
    tracing::info!("file logging smoke test");
    tracing::debug!("hidden at info");
    guard.flush();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("file logging smoke test"));
    assert!(content.contains("INFO"));
    assert!(!content.contains("hidden at info"));

    drop(guard);
    reset_logging();
}

#[test]
fn level_can_change_at_runtime() {
    let _lock = LOGGING.lock().unwrap_or_else(|p| p.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("level.log");

    let guard = init_logging(file_config(&path, LogLevel::Error)).unwrap();
    tracing::warn!("suppressed warning");
    set_level(LogLevel::Debug).unwrap();
    tracing::debug!("visible debug");
    guard.flush();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(!content.contains("suppressed warning"));
    assert!(content.contains("visible debug"));

    drop(guard);
    reset_logging();
}

#[test]
fn reinitializing_retargets_instead_of_duplicating() {
    let _lock = LOGGING.lock().unwrap_or_else(|p| p.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.log");
    let second = dir.path().join("second.log");

    let guard = init_logging(file_config(&first, LogLevel::Info)).unwrap();
    tracing::info!("to first");
    let guard2 = init_logging(file_config(&second, LogLevel::Info)).unwrap();
    tracing::info!("to second");
    guard.flush();
    guard2.flush();

    let a = std::fs::read_to_string(&first).unwrap();
    let b = std::fs::read_to_string(&second).unwrap();
    assert!(a.contains("to first") && !a.contains("to second"));
    assert_eq!(b.matches("to second").count(), 1);

    drop(guard);
    drop(guard2);
    reset_logging();
}

#[test]
fn reset_detaches_the_file() {
    let _lock = LOGGING.lock().unwrap_or_else(|p| p.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reset.log");

    let guard = init_logging(file_config(&path, LogLevel::Info)).unwrap();
    drop(guard);
    reset_logging();
    tracing::info!("after reset");

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(!content.contains("after reset"));
}

#[test]
fn lifecycle_transitions_are_logged_in_task_spans() {
    let _lock = LOGGING.lock().unwrap_or_else(|p| p.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spans.log");

    let guard = init_logging(file_config(&path, LogLevel::Info)).unwrap();
    let mut task = TaskRecord::pending("t-span");
    let span = start_task_span("start", &task.id);
    span.in_scope(|| lifecycle::start(&mut task));
    guard.flush();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("state_transition"));
    assert!(content.contains("t-span"));

    drop(guard);
    reset_logging();
}

#[test]
fn span_helpers_work_without_a_subscriber_file() {
    let span = start_task_span("complete", "t-1");
    record_state_transition(&span, "t-1", "in_progress", "done");
}

#[test]
fn rotating_file_is_usable_directly() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("direct.log");
    let mut file = RotatingFile::open(&path, 16, 1).unwrap();
    file.write_all(b"0123456789\n").unwrap();
    file.write_all(b"abcdefghij\n").unwrap();
    file.flush().unwrap();

    assert_eq!(file.path(), path.as_path());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "abcdefghij\n");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("direct.log.1")).unwrap(),
        "0123456789\n"
    );
}
