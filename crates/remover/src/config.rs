//! Rewrite configuration.
//!
//! Every field has a default, so a JSON file only lists what it overrides:
//!
//! ```json
//! {
//!   "buffer_size": 65536,
//!   "disk_access_mode": "mmap",
//!   "index_interval": 128,
//!   "bloom_fp_chance": 0.01,
//!   "sync": true,
//!   "threads": 4,
//!   "verify": true
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use sstable::DiskAccessMode;
use sstable::WriterOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteConfig {
    /// Read and write buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// How source data files are read.
    #[serde(default)]
    pub disk_access_mode: DiskAccessMode,

    /// One summary entry every `index_interval` partitions.
    #[serde(default = "default_index_interval")]
    pub index_interval: usize,

    /// False-positive rate of the destination partition filter.
    #[serde(default = "default_bloom_fp_chance")]
    pub bloom_fp_chance: f64,

    /// fsync every destination component before publishing it.
    #[serde(default = "default_true")]
    pub sync: bool,

    /// Files rewritten in parallel.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Recount destination partitions after each rewrite.
    #[serde(default = "default_true")]
    pub verify: bool,
}

fn default_buffer_size() -> usize {
    64 * 1024
}

fn default_index_interval() -> usize {
    128
}

fn default_bloom_fp_chance() -> f64 {
    0.01
}

fn default_threads() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            disk_access_mode: DiskAccessMode::default(),
            index_interval: default_index_interval(),
            bloom_fp_chance: default_bloom_fp_chance(),
            sync: true,
            threads: default_threads(),
            verify: true,
        }
    }
}

impl RewriteConfig {
    /// Loads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RewriteConfig = serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be positive".into()));
        }
        if self.index_interval == 0 {
            return Err(ConfigError::Invalid("index_interval must be positive".into()));
        }
        if !(self.bloom_fp_chance > 0.0 && self.bloom_fp_chance < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "bloom_fp_chance {} outside (0, 1)",
                self.bloom_fp_chance
            )));
        }
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".into()));
        }
        Ok(())
    }

    pub(crate) fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            buffer_size: self.buffer_size,
            index_interval: self.index_interval,
            bloom_fp_chance: self.bloom_fp_chance,
            sync: self.sync,
        }
    }
}
