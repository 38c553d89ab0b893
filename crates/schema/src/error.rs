use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cql parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },
    #[error("invalid table definition {table}: {message}")]
    Invalid { table: String, message: String },
    #[error("keyspace {0} does not exist")]
    KeyspaceNotFound(String),
    #[error("table {keyspace}.{table} does not exist")]
    TableNotFound { keyspace: String, table: String },
    #[error("unknown partitioner {0}")]
    UnknownPartitioner(String),
}

impl SchemaError {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        SchemaError::Parse {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(table: &str, message: impl Into<String>) -> Self {
        SchemaError::Invalid {
            table: table.to_string(),
            message: message.into(),
        }
    }
}
