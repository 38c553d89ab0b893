use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SSTableError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt {path} at offset {offset}: {reason}")]
    Corrupt {
        path: PathBuf,
        offset: u64,
        reason: String,
    },
    #[error("unsupported sstable version {0:?}")]
    UnsupportedVersion(String),
    #[error("not an sstable component name: {0}")]
    InvalidFilename(PathBuf),
    #[error("sstable {0} is incomplete (no TOC.txt)")]
    Incomplete(PathBuf),
    #[error("partition keys out of order in {path}")]
    OutOfOrder { path: PathBuf },
    #[error("{0} records cannot be written to this sstable generation")]
    WrongGeneration(&'static str),
    #[error("column {0} is not part of the serialization header")]
    UnknownColumn(String),
    #[error("row does not fit the serialization header: {0}")]
    HeaderMismatch(String),
    #[error("partition filter: {0}")]
    Filter(String),
    #[error("statistics of {path}: {source}")]
    Stats {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{what} of {len} exceeds the format limit of {limit}")]
    TooLarge {
        what: &'static str,
        len: usize,
        limit: usize,
    },
    #[error("writer misuse: {0}")]
    State(&'static str),
    #[error(transparent)]
    Schema(#[from] schema::SchemaError),
}

impl SSTableError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SSTableError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, offset: u64, reason: impl Into<String>) -> Self {
        SSTableError::Corrupt {
            path: path.into(),
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SSTableError>;
