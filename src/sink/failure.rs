//! Analysis error writer.
//!
//! Errors are history: a second error for the same block never replaces
//! the first. It goes to `<block_id>__<timestamp>.json`, with the timestamp
//! stripped of `-` and `:`; if that name is taken too, `__2`, `__3`, ...
//! are appended.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ensure_dir, file_stem};
use crate::error::{Error, Result};
use crate::model::format_timestamp;
use crate::schema::Schema;
use crate::storage::{Replace, write_atomic};

/// One analysis failure, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub block_id: String,
    pub task_id: String,
    /// Category, e.g. "Network" or "ParseError".
    pub error_type: String,
    pub error_detail: String,
    /// Raw response that caused the error, if any.
    pub response_text: Option<String>,
    pub timestamp: String,
}

#[derive(Debug)]
pub struct ErrorSink {
    dir: PathBuf,
    schema: Schema,
}

impl ErrorSink {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            dir: base_dir.as_ref().join("Archive").join("AnalysisErrors"),
            schema: Schema::analysis_error()?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validate and write an error record, returning its path.
    pub fn write(
        &self,
        block_id: &str,
        task_id: &str,
        error_type: &str,
        error_detail: &str,
        response_text: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let report = ErrorReport {
            block_id: block_id.to_string(),
            task_id: task_id.to_string(),
            error_type: error_type.to_string(),
            error_detail: error_detail.to_string(),
            response_text: response_text.map(str::to_string),
            timestamp: format_timestamp(timestamp),
        };
        let value = serde_json::to_value(&report)?;
        self.schema.check(block_id, &value)?;
        let bytes = serde_json::to_vec(&report)?;

        let stem = file_stem(block_id)?;
        ensure_dir(&self.dir)?;

        let suffix: String = report
            .timestamp
            .chars()
            .filter(|c| *c != '-' && *c != ':')
            .collect();

        let mut attempt = 0usize;
        loop {
            let name = match attempt {
                0 => format!("{stem}.json"),
                1 => format!("{stem}__{suffix}.json"),
                n => format!("{stem}__{suffix}__{n}.json"),
            };
            let path = self.dir.join(name);

            let written = write_atomic(&path, Replace::Never, |out| {
                out.write_all(&bytes).map_err(|e| Error::storage(&path, e))
            });
            match written {
                Ok(()) => {
                    info!(block_id, task_id, path = %path.display(), "error written");
                    return Ok(path);
                }
                Err(e) if e.is_already_exists() => {
                    debug!(block_id, path = %path.display(), "error file taken, trying next name");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// All error files recorded for `block_id`, in the order they were
    /// written: the unsuffixed file, then by timestamp, then by counter.
    ///
    /// Only names this sink generates for `block_id` are matched, so
    /// `b__x.json` is not part of `b`'s history.
    pub fn history(&self, block_id: &str) -> Result<Vec<PathBuf>> {
        let stem = file_stem(block_id)?;
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::storage(&self.dir, e)),
        };

        let mut ranked: Vec<(HistoryRank, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let rank = HistoryRank::parse(stem, name.to_str()?)?;
                Some((rank, entry.path()))
            })
            .collect();
        ranked.sort();
        Ok(ranked.into_iter().map(|(_, path)| path).collect())
    }
}

/// Position of an error file within one block's history.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum HistoryRank {
    First,
    /// Timestamp suffix and collision counter (1 when absent).
    Later(String, usize),
}

impl HistoryRank {
    fn parse(stem: &str, name: &str) -> Option<Self> {
        let rest = name.strip_prefix(stem)?.strip_suffix(".json")?;
        if rest.is_empty() {
            return Some(HistoryRank::First);
        }
        let rest = rest.strip_prefix("__")?;
        let (ts, counter) = match rest.split_once("__") {
            Some((ts, raw)) => {
                // Only canonical counters: no sign, no leading zeros.
                let n: usize = raw.parse().ok().filter(|n| *n >= 2)?;
                (n.to_string() == raw).then_some((ts, n))?
            }
            None => (rest, 1),
        };
        is_compact_timestamp(ts).then(|| HistoryRank::Later(ts.to_string(), counter))
    }
}

/// `20240701T120000Z`: a formatted timestamp with `-` and `:` removed.
fn is_compact_timestamp(ts: &str) -> bool {
    let b = ts.as_bytes();
    b.len() == 16
        && b[8] == b'T'
        && b[15] == b'Z'
        && b[..8].iter().chain(&b[9..15]).all(u8::is_ascii_digit)
}
