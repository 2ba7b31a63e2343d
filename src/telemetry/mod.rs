//! Logging initialization and control.
//!
//! Installs one process-wide `tracing` subscriber the first time
//! [`init_logging`] is called: a reloadable level filter, a compact stderr
//! layer, and a plain-text layer writing to an optional size-rotated file.
//! Later calls reuse that subscriber and only retarget the level and file,
//! so writers are never duplicated. [`reset_logging`] detaches the file and
//! restores the default level; tests use it as a teardown hook.

pub mod rotate;
pub mod task;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Registry, reload};

use crate::error::{Error, Result};
use rotate::RotatingFile;

/// Default rotation threshold: 5 MiB.
pub const DEFAULT_MAX_BYTES: u64 = 5_242_880;

/// Default number of rotated files kept.
pub const DEFAULT_BACKUPS: usize = 5;

// ---------------------------------------------------------------------------
// Level
// ---------------------------------------------------------------------------

/// Diagnostic verbosity. Never affects control flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Parse a level name case-insensitively. `WARN` is accepted for
    /// `WARNING`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARNING" | "WARN" => Some(LogLevel::Warning),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }

    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        LogLevel::from_name(s).ok_or_else(|| Error::Config(format!("invalid log level: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where and how to rotate the log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    pub max_bytes: u64,
    pub backups: usize,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: DEFAULT_MAX_BYTES,
            backups: DEFAULT_BACKUPS,
        }
    }
}

/// Configuration for logging initialization.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    /// When `None`, logs go to stderr only.
    pub file: Option<LogFile>,
}

// ---------------------------------------------------------------------------
// Process-wide state
// ---------------------------------------------------------------------------

type FileSlot = Arc<Mutex<Option<RotatingFile>>>;

struct LogState {
    filter: reload::Handle<EnvFilter, Registry>,
    file: FileSlot,
}

static STATE: OnceLock<LogState> = OnceLock::new();
static INSTALL: Mutex<()> = Mutex::new(());

/// Get the installed state, installing the subscriber on first use.
fn state() -> Result<&'static LogState> {
    if let Some(state) = STATE.get() {
        return Ok(state);
    }

    let _lock = INSTALL
        .lock()
        .map_err(|_| Error::Other("logging install lock poisoned".into()))?;
    if let Some(state) = STATE.get() {
        return Ok(state);
    }

    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let initial = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(LogLevel::default().directive()));
    let (filter, handle) = reload::Layer::new(initial);
    let file: FileSlot = Arc::new(Mutex::new(None));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(FileSink(Arc::clone(&file))),
        )
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    Ok(STATE.get_or_init(|| LogState {
        filter: handle,
        file,
    }))
}

/// Guard that flushes the log file on drop.
///
/// Hold it for the lifetime of the application.
#[must_use = "dropping the guard flushes the log file immediately"]
pub struct LogGuard {
    _private: (),
}

impl LogGuard {
    /// Flush the log file, if one is attached.
    pub fn flush(&self) {
        flush_file();
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        flush_file();
    }
}

/// Initialize logging, or retarget it if already initialized.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened, or if a different
/// global subscriber was installed before the first call.
pub fn init_logging(config: LogConfig) -> Result<LogGuard> {
    let state = state()?;

    let file = match config.file {
        Some(log_file) => Some(
            RotatingFile::open(&log_file.path, log_file.max_bytes, log_file.backups)
                .map_err(|e| Error::storage(&log_file.path, e))?,
        ),
        None => None,
    };
    replace_file(state, file);
    set_level(config.level)?;

    Ok(LogGuard { _private: () })
}

/// Change verbosity at runtime.
pub fn set_level(level: LogLevel) -> Result<()> {
    let state = state()?;
    state
        .filter
        .reload(EnvFilter::new(level.directive()))
        .map_err(|e| Error::Other(format!("failed to set log level: {e}")))
}

/// Detach and flush the log file and restore the default level.
///
/// Does nothing if logging was never initialized.
pub fn reset_logging() {
    let Some(state) = STATE.get() else {
        return;
    };
    replace_file(state, None);
    let _ = state
        .filter
        .reload(EnvFilter::new(LogLevel::default().directive()));
}

fn replace_file(state: &LogState, file: Option<RotatingFile>) {
    let mut slot = state.file.lock().unwrap_or_else(|p| p.into_inner());
    if let Some(old) = slot.as_mut() {
        let _ = old.flush();
    }
    *slot = file;
}

fn flush_file() {
    if let Some(state) = STATE.get() {
        let mut slot = state.file.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(file) = slot.as_mut() {
            let _ = file.flush();
        }
    }
}

// ---------------------------------------------------------------------------
// File writer
// ---------------------------------------------------------------------------

/// `MakeWriter` over the shared file slot. Writes are dropped while no
/// file is attached.
#[derive(Clone)]
struct FileSink(FileSlot);

struct FileSinkWriter(FileSlot);

impl<'a> MakeWriter<'a> for FileSink {
    type Writer = FileSinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        FileSinkWriter(Arc::clone(&self.0))
    }
}

impl Write for FileSinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut slot = self.0.lock().unwrap_or_else(|p| p.into_inner());
        match slot.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut slot = self.0.lock().unwrap_or_else(|p| p.into_inner());
        match slot.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse_case_insensitively() {
        assert_eq!(LogLevel::from_name("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_name(" Warning "), Some(LogLevel::Warning));
        assert_eq!(LogLevel::from_name("WARN"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::from_name("trace"), None);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn level_displays_canonical_name() {
        assert_eq!(LogLevel::Warning.to_string(), "WARNING");
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }
}
