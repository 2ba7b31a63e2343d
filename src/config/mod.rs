//! Typed configuration from environment variables.
//!
//! Everything has a default; only malformed numeric values fail. The log
//! level never fails: an unrecognized name falls back to `INFO`.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::telemetry::{DEFAULT_BACKUPS, DEFAULT_MAX_BYTES, LogConfig, LogFile, LogLevel};

pub const LOG_LEVEL_VAR: &str = "OPERATOR_LOG_LEVEL";
pub const ARCHIVE_DIR_VAR: &str = "OPERATOR_ARCHIVE_DIR";
pub const QUEUE_PATH_VAR: &str = "OPERATOR_QUEUE_PATH";
pub const LOG_FILE_VAR: &str = "OPERATOR_LOG_FILE";
pub const LOG_MAX_BYTES_VAR: &str = "OPERATOR_LOG_MAX_BYTES";
pub const LOG_BACKUPS_VAR: &str = "OPERATOR_LOG_BACKUPS";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: LogLevel,
    /// Base of the `Archive/` tree that results, errors and logs go under.
    pub archive_dir: PathBuf,
    pub queue_path: PathBuf,
    pub log_file: PathBuf,
    pub log_max_bytes: u64,
    pub log_backups: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let archive_dir = std::env::var(ARCHIVE_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let log_level = match std::env::var(LOG_LEVEL_VAR) {
            Ok(name) => LogLevel::from_name(&name).unwrap_or_default(),
            Err(_) => LogLevel::default(),
        };

        Ok(Self {
            log_level,
            queue_path: std::env::var(QUEUE_PATH_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| archive_dir.join("queue.jsonl")),
            log_file: std::env::var(LOG_FILE_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| archive_dir.join("Archive").join("Logs").join("operator.log")),
            log_max_bytes: numeric_var(LOG_MAX_BYTES_VAR, DEFAULT_MAX_BYTES)?,
            log_backups: numeric_var(LOG_BACKUPS_VAR, DEFAULT_BACKUPS)?,
            archive_dir,
        })
    }

    /// Logging setup for this configuration, writing to the rotated file.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            file: Some(LogFile {
                path: self.log_file.clone(),
                max_bytes: self.log_max_bytes,
                backups: self.log_backups,
            }),
        }
    }
}

fn numeric_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{name} must be a non-negative integer, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}
