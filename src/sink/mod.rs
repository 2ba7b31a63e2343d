//! Writers for terminal task outcomes.
//!
//! Both sinks live under an archive base directory:
//! `Archive/AnalysisResults/<block_id>.json` for results and
//! `Archive/AnalysisErrors/<block_id>[__<timestamp>].json` for errors. Every
//! file is schema-checked before it is written and written atomically.

pub mod failure;
pub mod result;

pub use failure::{ErrorReport, ErrorSink};
pub use result::{ResultReport, ResultSink};

use std::path::Path;

use crate::error::{Error, Result};

/// Make sure a block id can be used as a file name.
fn file_stem(block_id: &str) -> Result<&str> {
    let unsafe_id = block_id.is_empty()
        || block_id == "."
        || block_id.contains("..")
        || block_id.contains(['/', '\\', '\0']);
    if unsafe_id {
        return Err(Error::schema(
            block_id,
            "block_id cannot be used as a file name",
        ));
    }
    Ok(block_id)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::storage(dir, e))
}
