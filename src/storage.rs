//! Queue file storage.
//!
//! The queue is a JSON Lines file: one task per non-empty line. It holds
//! the full history (terminal tasks are never removed) plus open work, and
//! is rewritten in full on every save via temp file, fsync and rename.
//!
//! Only one writer may own a queue file at a time. Nothing here locks.

use std::cmp::Ordering;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::model::{TaskRecord, TaskStatus};
use crate::schema::Schema;

/// Loads and saves queue files.
#[derive(Debug)]
pub struct QueueStore {
    schema: Schema,
}

impl QueueStore {
    pub fn new() -> Result<Self> {
        Ok(Self {
            schema: Schema::queue_line()?,
        })
    }

    /// Load every valid task from a queue file, in file order.
    ///
    /// Lines that are not JSON (including lines that are not UTF-8) or fail
    /// the queue-line schema are logged and skipped; they never abort the
    /// load. A missing file is an error.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Vec<TaskRecord>> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|e| Error::storage(path, e))?;

        let mut tasks = Vec::new();
        let mut skipped = 0usize;

        for (idx, line) in content.split(|b| *b == b'\n').enumerate() {
            let line_no = idx + 1;
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }

            match self.parse_line(path, line_no, line) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    error!(path = %path.display(), line = line_no, "skipping queue line: {e}");
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            info!(
                path = %path.display(),
                loaded = tasks.len(),
                skipped,
                "loaded {} task(s), skipped {skipped} invalid line(s)",
                tasks.len()
            );
        } else {
            info!(path = %path.display(), loaded = tasks.len(), "loaded {} task(s)", tasks.len());
        }

        Ok(tasks)
    }

    fn parse_line(&self, path: &Path, line_no: usize, line: &[u8]) -> Result<TaskRecord> {
        let subject = format!("{}:{line_no}", path.display());
        let value: Value = serde_json::from_slice(line)
            .map_err(|e| Error::schema(&subject, format!("invalid JSON: {e}")))?;
        self.schema.check(&subject, &value)?;
        serde_json::from_value(value).map_err(|e| Error::schema(&subject, e.to_string()))
    }

    /// Atomically replace the queue file with `tasks`.
    ///
    /// Every task is checked against the queue-line schema first, so a save
    /// never writes a line the next load would drop. Then a temporary file
    /// in the target's directory is written, flushed, synced and renamed
    /// over `path`. On any failure the existing queue file is left as it
    /// was.
    pub fn save(&self, path: impl AsRef<Path>, tasks: &[TaskRecord]) -> Result<()> {
        let path = path.as_ref();

        let mut lines = Vec::with_capacity(tasks.len());
        for task in tasks {
            let value = serde_json::to_value(task)?;
            self.schema.check(&task.id, &value).inspect_err(|e| {
                error!(path = %path.display(), task_id = %task.id, "refusing to save queue: {e}");
            })?;
            let mut line = serde_json::to_vec(task)?;
            line.push(b'\n');
            lines.push(line);
        }

        write_atomic(path, Replace::Overwrite, |out| {
            for line in &lines {
                out.write_all(line).map_err(|e| Error::storage(path, e))?;
            }
            Ok(())
        })
        .inspect_err(|e| error!(path = %path.display(), "failed to save queue: {e}"))?;

        info!(path = %path.display(), tasks = tasks.len(), "queue saved");
        Ok(())
    }
}

/// Whether [`write_atomic`] may replace an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Replace {
    Overwrite,
    /// Fail with `AlreadyExists` instead.
    Never,
}

/// Write a file so that readers see either the old content or the complete
/// new content, never a partial write.
///
/// `fill` writes into a temporary file in the target's directory, which is
/// then flushed, synced and renamed into place. The temporary file is
/// removed on every failure path.
pub(crate) fn write_atomic<F>(path: &Path, replace: Replace, fill: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".blockq-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::storage(dir, e))?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        fill(&mut writer)?;
        writer.flush().map_err(|e| Error::storage(path, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::storage(path, e))?;

    // A failed persist hands the temp file back inside the error, where it
    // is dropped and deleted.
    let persisted = match replace {
        Replace::Overwrite => tmp.persist(path),
        Replace::Never => tmp.persist_noclobber(path),
    };
    persisted.map_err(|e| Error::storage(path, e.error))?;
    sync_parent_dir(dir)
}

fn sync_parent_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let handle = std::fs::File::open(dir).map_err(|e| Error::storage(dir, e))?;
        handle.sync_all().map_err(|e| Error::storage(dir, e))?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Sort key for `created_at`. Parsed timestamps order before raw strings,
/// so unparsable values sort after every valid one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CreatedKey {
    Parsed(DateTime<Utc>),
    Raw(String),
}

impl CreatedKey {
    pub fn of(created_at: &str) -> Self {
        match parse_created_at(created_at) {
            Some(ts) => CreatedKey::Parsed(ts),
            None => {
                warn!(created_at, "could not parse created_at, ordering it after valid timestamps");
                CreatedKey::Raw(created_at.to_string())
            }
        }
    }
}

/// Parse a creation timestamp.
///
/// Accepts RFC 3339 with `Z` or an offset, and naive date-times or bare
/// dates, which are taken as UTC.
pub fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Pending tasks in dequeue order: priority descending, then `created_at`
/// ascending. Ties keep their order in `tasks`.
pub fn select_pending(tasks: &[TaskRecord]) -> Vec<TaskRecord> {
    let mut keyed: Vec<(CreatedKey, &TaskRecord)> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .map(|t| (CreatedKey::of(&t.created_at), t))
        .collect();

    // sort_by is stable
    keyed.sort_by(|(a_key, a), (b_key, b)| match b.priority.cmp(&a.priority) {
        Ordering::Equal => a_key.cmp(b_key),
        other => other,
    });

    keyed.into_iter().map(|(_, t)| t.clone()).collect()
}

/// Find a task by id.
pub fn find<'a>(tasks: &'a [TaskRecord], id: &str) -> Option<&'a TaskRecord> {
    tasks.iter().find(|t| t.id == id)
}

/// Find a task by id for mutation.
pub fn find_mut<'a>(tasks: &'a mut [TaskRecord], id: &str) -> Option<&'a mut TaskRecord> {
    tasks.iter_mut().find(|t| t.id == id)
}
