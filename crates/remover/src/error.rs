use std::path::{Path, PathBuf};

use sstable::SSTableError;
use thiserror::Error;

use crate::config::ConfigError;

/// Why rewriting one source file failed.
///
/// Errors from the codec and schema layers are folded into these variants at
/// the engine boundary; callers never see an `SSTableError` or `SchemaError`.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("unsupported format {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("no schema for {table}: {reason}")]
    SchemaUnavailable { table: String, reason: String },

    #[error("corrupt source {path} at offset {offset}: {reason}")]
    CorruptSource {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    #[error("malformed range tombstone in {path}, partition {key}: {reason}")]
    MalformedRangeTombstone {
        path: PathBuf,
        /// Hex encoded partition key.
        key: String,
        reason: String,
    },

    #[error("cannot write destination {path}: {reason}")]
    DestinationUnavailable { path: PathBuf, reason: String },

    #[error("rewritten {path} holds {actual} partitions, source held {expected}")]
    Verification { path: PathBuf, expected: u64, actual: u64 },

    #[error("rewrite of {path} cancelled")]
    Cancelled { path: PathBuf },

    /// Rejected before any file is touched.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RewriteError {
    /// `true` when the source file itself is damaged or inconsistent and
    /// should be reported for inspection.
    pub fn marks_source_suspect(&self) -> bool {
        matches!(
            self,
            RewriteError::CorruptSource { .. } | RewriteError::MalformedRangeTombstone { .. }
        )
    }

    pub(crate) fn schema(table: impl Into<String>, reason: impl ToString) -> Self {
        RewriteError::SchemaUnavailable {
            table: table.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn destination(path: &Path, reason: impl ToString) -> Self {
        RewriteError::DestinationUnavailable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(path: &Path, key: &[u8], reason: impl ToString) -> Self {
        RewriteError::MalformedRangeTombstone {
            path: path.to_path_buf(),
            key: hex::encode(key),
            reason: reason.to_string(),
        }
    }

    /// Maps a codec error raised while reading `path`.
    pub(crate) fn from_source(path: &Path, err: SSTableError) -> Self {
        match err {
            SSTableError::Corrupt { path, offset, reason } => RewriteError::CorruptSource { path, offset, reason },
            SSTableError::UnsupportedVersion(tag) => RewriteError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("unknown version {:?}", tag),
            },
            SSTableError::InvalidFilename(p) => RewriteError::UnsupportedFormat {
                path: p,
                reason: "not an sstable component".to_string(),
            },
            SSTableError::Schema(e) => RewriteError::SchemaUnavailable {
                table: path.display().to_string(),
                reason: e.to_string(),
            },
            other => RewriteError::CorruptSource {
                path: path.to_path_buf(),
                offset: 0,
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, RewriteError>;
