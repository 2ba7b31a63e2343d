//! Block record validation.
//!
//! A block is checked against the block schema, then against integrity
//! rules computed from re-encoding its text: length, encoding, size bound,
//! recorded size, recorded hash and sequence bounds.
//!
//! Schema failures are always hard. Integrity findings are hard only in
//! strict mode, which always applies to blocks whose status is `ok` and may
//! be requested for any other block; otherwise they are collected as
//! warnings in the returned [`ValidationReport`].

use std::path::Path;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::charset::Charset;
use crate::error::{Error, Result};
use crate::model::{BlockRecord, BlockStatus};
use crate::schema::Schema;

/// Maximum text length, in characters.
pub const MAX_TEXT_CHARS: usize = 20_000;

/// Maximum encoded size, in bytes.
pub const MAX_ENCODED_BYTES: usize = 1_048_576;

/// Allowed relative drift between recorded and computed size.
pub const SIZE_TOLERANCE: f64 = 0.08;

/// An integrity rule that can flag a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    TextLength,
    Encoding,
    SizeLimit,
    SizeMismatch,
    Hash,
    Sequence,
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Rule::TextLength => "text_length",
            Rule::Encoding => "encoding",
            Rule::SizeLimit => "size_limit",
            Rule::SizeMismatch => "size_mismatch",
            Rule::Hash => "hash",
            Rule::Sequence => "sequence",
        };
        write!(f, "{s}")
    }
}

/// A rule flagged in soft mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub rule: Rule,
    pub message: String,
}

/// Outcome of a validation that did not fail hard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub block_id: String,
    pub strict: bool,
    /// Rules flagged in soft mode, in check order.
    pub warnings: Vec<Violation>,
    /// Charset the size and hash were computed with. Differs from the
    /// declared one after a soft-mode fallback to UTF-8.
    pub encoding_used: &'static str,
    pub computed_size: usize,
    pub computed_hash: String,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn flagged(&self, rule: Rule) -> bool {
        self.warnings.iter().any(|w| w.rule == rule)
    }
}

/// Validates block records. Stateless apart from the compiled schema.
#[derive(Debug)]
pub struct RecordValidator {
    schema: Schema,
}

impl RecordValidator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            schema: Schema::block()?,
        })
    }

    /// Read a block file and validate it, strictly if its status is `ok`.
    pub fn read_block(&self, path: impl AsRef<Path>) -> Result<(BlockRecord, ValidationReport)> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::storage(path, e))?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| Error::schema(path.display().to_string(), format!("invalid JSON: {e}")))?;
        self.validate_value(&value, false)
    }

    /// Validate an untyped record. `strict` can only tighten: an `ok` block
    /// is always validated strictly.
    pub fn validate_value(
        &self,
        value: &Value,
        strict: bool,
    ) -> Result<(BlockRecord, ValidationReport)> {
        let subject = value
            .get("block_id")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>");

        if !value.is_object() {
            return Err(Error::schema(subject, "block must be a JSON object"));
        }
        self.schema.check(subject, value)?;

        let record: BlockRecord = serde_json::from_value(value.clone())
            .map_err(|e| Error::schema(subject, e.to_string()))?;
        let report = self.check_integrity(&record, strict || record.requires_strict())?;
        Ok((record, report))
    }

    /// Validate a typed record. As with [`validate_value`](Self::validate_value),
    /// `strict = false` is ignored for `ok` blocks.
    pub fn validate(&self, record: &BlockRecord, strict: bool) -> Result<ValidationReport> {
        let value = serde_json::to_value(record)?;
        self.schema.check(&record.block_id, &value)?;
        self.check_integrity(record, strict || record.requires_strict())
    }

    fn check_integrity(&self, record: &BlockRecord, strict: bool) -> Result<ValidationReport> {
        let block_id = record.block_id.as_str();
        let mut checker = Checker {
            block_id,
            strict,
            warnings: Vec::new(),
        };

        let text_len = record.text.chars().count();
        if text_len > MAX_TEXT_CHARS {
            checker.flag(
                Rule::TextLength,
                format!("text length {text_len} > {MAX_TEXT_CHARS}"),
            )?;
        }

        let (bytes, encoding_used) = match Charset::for_label(&record.encoding)
            .and_then(|charset| charset.encode(&record.text).map(|b| (b, charset.name())))
        {
            Ok(encoded) => encoded,
            Err(e) => {
                let message = format!(
                    "failed to encode text with encoding '{}': {e}; using utf-8",
                    record.encoding
                );
                if strict {
                    error!(block_id, rule = %Rule::Encoding, "{message}");
                    return Err(Error::Encoding {
                        block_id: block_id.to_string(),
                        encoding: record.encoding.clone(),
                        detail: e.to_string(),
                    });
                }
                warn!(block_id, rule = %Rule::Encoding, "{message}");
                checker.warnings.push(Violation {
                    rule: Rule::Encoding,
                    message,
                });
                (record.text.as_bytes().to_vec(), Charset::Utf8.name())
            }
        };
        let computed_size = bytes.len();

        if computed_size > MAX_ENCODED_BYTES {
            checker.flag(
                Rule::SizeLimit,
                format!("encoded text size {computed_size} bytes > {MAX_ENCODED_BYTES}"),
            )?;
        }

        let recorded_size = record.size_bytes;
        if size_mismatch(recorded_size, computed_size as u64) {
            checker.flag(
                Rule::SizeMismatch,
                format!(
                    "size_bytes mismatch: recorded {recorded_size}, computed {computed_size} (diff {} bytes)",
                    recorded_size.abs_diff(computed_size as u64)
                ),
            )?;
        }

        let computed_hash = sha256_hex(&bytes);
        if computed_hash != record.hash_sha256 {
            checker.flag(
                Rule::Hash,
                format!(
                    "hash mismatch: recorded {}, computed {computed_hash}",
                    record.hash_sha256
                ),
            )?;
        }

        if let (Some(seq), Some(total)) = (record.seq, record.total_seqs) {
            if !(1 <= seq && seq <= total) {
                checker.flag(
                    Rule::Sequence,
                    format!("sequence number {seq} outside of range 1..{total}"),
                )?;
            }
        }

        if matches!(record.status, BlockStatus::Damaged | BlockStatus::Binary) {
            info!(block_id, status = %record.status, "block status is not ok");
        }

        Ok(ValidationReport {
            block_id: block_id.to_string(),
            strict,
            warnings: checker.warnings,
            encoding_used,
            computed_size,
            computed_hash,
        })
    }
}

struct Checker<'a> {
    block_id: &'a str,
    strict: bool,
    warnings: Vec<Violation>,
}

impl Checker<'_> {
    /// Raise in strict mode, record a warning otherwise.
    fn flag(&mut self, rule: Rule, message: String) -> Result<()> {
        if self.strict {
            error!(block_id = self.block_id, rule = %rule, "{message}");
            return Err(Error::Integrity {
                block_id: self.block_id.to_string(),
                rule,
                detail: message,
            });
        }
        warn!(block_id = self.block_id, rule = %rule, "{message}");
        self.warnings.push(Violation { rule, message });
        Ok(())
    }
}

/// Is the computed size outside tolerance of the recorded one?
///
/// A recorded size of zero only matches an empty payload.
pub fn size_mismatch(recorded: u64, computed: u64) -> bool {
    if recorded == 0 {
        return computed != 0;
    }
    recorded.abs_diff(computed) as f64 > recorded as f64 * SIZE_TOLERANCE
}

/// Lowercase hex SHA-256.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
