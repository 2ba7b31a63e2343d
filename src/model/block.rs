//! Block record types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::whole_number;

/// One unit of source text, produced upstream and never mutated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub block_id: String,

    /// 1-based position within a multi-part split.
    #[serde(default, deserialize_with = "whole_number::to_opt_i64")]
    pub seq: Option<i64>,
    #[serde(default, deserialize_with = "whole_number::to_opt_i64")]
    pub total_seqs: Option<i64>,

    pub text: String,

    /// Declared charset name, e.g. "utf-8" or "windows-1251".
    pub encoding: String,

    /// Byte length recorded upstream.
    #[serde(deserialize_with = "whole_number::to_u64")]
    pub size_bytes: u64,

    /// Recorded SHA-256 of the encoded text, lowercase hex.
    pub hash_sha256: String,

    pub status: BlockStatus,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BlockRecord {
    /// Blocks that claim to be intact are validated strictly.
    pub fn requires_strict(&self) -> bool {
        self.status == BlockStatus::Ok
    }
}

/// Upstream's verdict on a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Ok,
    Damaged,
    Binary,
}

impl std::fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BlockStatus::Ok => "ok",
            BlockStatus::Damaged => "damaged",
            BlockStatus::Binary => "binary",
        };
        write!(f, "{s}")
    }
}
