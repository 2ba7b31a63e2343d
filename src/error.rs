//! Error types for blockq.

use std::path::PathBuf;

use thiserror::Error;

use crate::validate::Rule;

#[derive(Debug, Error)]
pub enum Error {
    /// Structural shape rejected. Never downgraded to a warning.
    #[error("schema violation in {subject}: {message}")]
    Schema { subject: String, message: String },

    /// A flagged integrity rule on a strictly validated record.
    #[error("[{block_id}] integrity violation ({rule}): {detail}")]
    Integrity {
        block_id: String,
        rule: Rule,
        detail: String,
    },

    /// The declared charset cannot encode the payload.
    #[error("[{block_id}] cannot encode text as '{encoding}': {detail}")]
    Encoding {
        block_id: String,
        encoding: String,
        detail: String,
    },

    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn schema(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Schema {
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub(crate) fn is_already_exists(&self) -> bool {
        matches!(self, Error::Storage { source, .. } if source.kind() == std::io::ErrorKind::AlreadyExists)
    }

    /// The integrity rule behind this error, if it is an integrity or
    /// encoding failure.
    pub fn rule(&self) -> Option<Rule> {
        match self {
            Error::Integrity { rule, .. } => Some(*rule),
            Error::Encoding { .. } => Some(Rule::Encoding),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
