//! Picks the read and write strategy for a source file's format generation.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use schema::TableSchema;
use sstable::{Component, Descriptor, FormatGeneration, SSTableReader, SerializationHeader, Version};

use crate::config::RewriteConfig;
use crate::error::{Result, RewriteError};
use crate::scanner::PartitionScanner;
use crate::writer::RewriteWriter;

/// Row model of a format generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatStrategy {
    /// `jb`, `ka`, `la`: flat cell atoms, whole range tombstones, no embedded
    /// schema.
    Legacy,
    /// `ma`..`nb`: rows with complex columns and tombstone markers, encoded
    /// against the serialization header in the statistics.
    Modern,
}

impl FormatStrategy {
    pub fn for_version(version: Version) -> Self {
        match version.generation() {
            FormatGeneration::Legacy => FormatStrategy::Legacy,
            FormatGeneration::Modern => FormatStrategy::Modern,
        }
    }

    pub fn resolve(descriptor: &Descriptor) -> Self {
        Self::for_version(descriptor.version)
    }

    /// Parses a `Data.db` path into its descriptor and strategy.
    ///
    /// Paths naming another component, and names carrying an unknown version
    /// tag, fail with [`RewriteError::UnsupportedFormat`].
    pub fn from_data_path(path: &Path) -> Result<(Descriptor, FormatStrategy)> {
        let (descriptor, component) =
            Descriptor::from_path(path).map_err(|e| RewriteError::from_source(path, e))?;
        if component != Component::Data {
            return Err(RewriteError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("expected a Data.db component, got {}", component),
            });
        }
        let strategy = Self::resolve(&descriptor);
        Ok((descriptor, strategy))
    }

    /// `true` when the files of this generation carry their own schema.
    pub fn is_self_describing(&self) -> bool {
        matches!(self, FormatStrategy::Modern)
    }

    /// Serialization header the destination is written with. Modern files
    /// keep the source's header so column positions are reproduced exactly.
    pub fn destination_header(&self, source: &SSTableReader) -> Result<Option<SerializationHeader>> {
        match self {
            FormatStrategy::Legacy => Ok(None),
            FormatStrategy::Modern => match &source.stats().header {
                Some(header) => Ok(Some(header.clone())),
                None => Err(missing_header(source)),
            },
        }
    }

    pub fn open_scanner(
        &self,
        source: &SSTableReader,
        schema: Arc<TableSchema>,
        config: &RewriteConfig,
    ) -> Result<PartitionScanner> {
        PartitionScanner::open(source, *self, schema, config)
    }

    pub fn create_writer(
        &self,
        source: &SSTableReader,
        destination: &Descriptor,
        schema: &TableSchema,
        expected_keys: u64,
        config: &RewriteConfig,
    ) -> Result<RewriteWriter> {
        let header = self.destination_header(source)?;
        RewriteWriter::create(
            *self,
            source.descriptor().path_for(Component::Data),
            destination,
            schema,
            header,
            expected_keys,
            config,
        )
    }
}

pub(crate) fn missing_header(source: &SSTableReader) -> RewriteError {
    RewriteError::CorruptSource {
        path: source.descriptor().path_for(Component::Statistics),
        offset: 0,
        reason: "modern sstable statistics carry no serialization header".to_string(),
    }
}

impl fmt::Display for FormatStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatStrategy::Legacy => write!(f, "legacy"),
            FormatStrategy::Modern => write!(f, "modern"),
        }
    }
}
