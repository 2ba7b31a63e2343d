//! Analysis result writer.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{ensure_dir, file_stem};
use crate::error::{Error, Result};
use crate::model::format_timestamp;
use crate::schema::Schema;
use crate::storage::{Replace, write_atomic};

/// One analysis result, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultReport {
    pub block_id: String,
    pub model: String,
    pub completed_at: String,
    pub analysis_version: String,
    pub analysis: Value,
}

/// Writes one result file per block. Existing results are never
/// overwritten.
#[derive(Debug)]
pub struct ResultSink {
    dir: PathBuf,
    payload: Schema,
    wrapper: Schema,
}

impl ResultSink {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            dir: base_dir.as_ref().join("Archive").join("AnalysisResults"),
            payload: Schema::analysis_payload()?,
            wrapper: Schema::analysis_result()?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the result for `block_id` lives.
    pub fn path_for(&self, block_id: &str) -> Result<PathBuf> {
        Ok(self.dir.join(format!("{}.json", file_stem(block_id)?)))
    }

    /// Validate and write a result, returning its path.
    ///
    /// If a result for `block_id` already exists, its path is returned and
    /// nothing is written.
    pub fn write(
        &self,
        block_id: &str,
        model: &str,
        analysis_version: &str,
        analysis: &Value,
        completed_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        self.payload.check(block_id, analysis)?;

        let report = ResultReport {
            block_id: block_id.to_string(),
            model: model.to_string(),
            completed_at: format_timestamp(completed_at),
            analysis_version: analysis_version.to_string(),
            analysis: analysis.clone(),
        };
        let value = serde_json::to_value(&report)?;
        self.wrapper.check(block_id, &value)?;
        let bytes = serde_json::to_vec(&report)?;

        let path = self.path_for(block_id)?;
        ensure_dir(&self.dir)?;
        if path.exists() {
            info!(block_id, path = %path.display(), "result already exists; skipping write");
            return Ok(path);
        }

        match write_atomic(&path, Replace::Never, |out| {
            out.write_all(&bytes).map_err(|e| Error::storage(&path, e))
        }) {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                info!(block_id, path = %path.display(), "result already exists; skipping write");
                return Ok(path);
            }
            Err(e) => return Err(e),
        }

        info!(block_id, path = %path.display(), "result written");
        Ok(path)
    }

    /// Read back a stored result.
    pub fn read(&self, block_id: &str) -> Result<ResultReport> {
        let path = self.path_for(block_id)?;
        let content =
            std::fs::read_to_string(&path).map_err(|e| Error::storage(&path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}
