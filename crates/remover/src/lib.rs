//! Offline removal of cell expiration from SSTables.
//!
//! Each source table is rewritten into `<output_root>/<keyspace>/<table>/`
//! under the same version and generation. Expiring cells become live cells
//! with the same value and timestamp; tombstones, partition deletions and
//! range tombstones are copied unchanged. Sources are never modified.
//!
//! Per file the pipeline is:
//!
//! ```text
//! adapter ──▶ resolver ──▶ key_counter ──▶ scanner ──▶ transform / reconciler ──▶ writer
//! ```
//!
//! A failing file never stops the batch: its error is recorded in the
//! [`RewriteSummary`] and the partial destination is removed. Only problems
//! that concern the whole batch (bad configuration, an unusable output
//! root) are returned as `Err`.

pub mod adapter;
mod cancel;
pub mod config;
mod error;
pub mod key_counter;
pub mod reconciler;
pub mod resolver;
mod rewrite;
pub mod scanner;
pub mod transform;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{error, info, warn};

pub use adapter::FormatStrategy;
pub use cancel::CancellationToken;
pub use config::{ConfigError, DiskAccessMode, RewriteConfig};
pub use error::{Result, RewriteError};
pub use key_counter::count_keys;
pub use reconciler::{RangeTombstoneReconciler, ReconcileError};
pub use resolver::SchemaSource;
pub use rewrite::{destination_for, rewrite_file, RewrittenFile};
pub use transform::{transform_row, RowTransform};

/// A source file that could not be rewritten.
#[derive(Debug)]
pub struct FailedFile {
    pub source: PathBuf,
    pub error: RewriteError,
}

/// Outcome of a batch, in source order.
#[derive(Debug, Default)]
pub struct RewriteSummary {
    pub rewritten: Vec<RewrittenFile>,
    pub failed: Vec<FailedFile>,
    /// Sources found corrupt or inconsistent, worth inspecting by hand.
    pub suspect: Vec<PathBuf>,
}

impl RewriteSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn partitions(&self) -> u64 {
        self.rewritten.iter().map(|f| f.partitions).sum()
    }

    pub fn stripped_cells(&self) -> u64 {
        self.rewritten.iter().map(|f| f.stripped_cells).sum()
    }

    fn record(&mut self, source: PathBuf, outcome: Result<RewrittenFile>) {
        match outcome {
            Ok(file) => self.rewritten.push(file),
            Err(e) => {
                match &e {
                    RewriteError::SchemaUnavailable { .. } => {
                        warn!(source = %source.display(), error = %e, "skipping sstable")
                    }
                    _ => error!(source = %source.display(), error = %e, "sstable rewrite failed"),
                }
                if e.marks_source_suspect() {
                    self.suspect.push(source.clone());
                }
                self.failed.push(FailedFile { source, error: e });
            }
        }
    }
}

/// Batch driver with its configuration.
///
/// ```no_run
/// use remover::{SchemaSource, TtlRemover};
/// # fn main() -> remover::Result<()> {
/// let summary = TtlRemover::new("/tmp/out", SchemaSource::SelfDescribing)
///     .run(&["/data/ks/t/mc-1-big-Data.db".into()])?;
/// assert!(summary.is_success());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TtlRemover {
    output_root: PathBuf,
    schema: SchemaSource,
    config: RewriteConfig,
    cancel: CancellationToken,
}

impl TtlRemover {
    pub fn new(output_root: impl Into<PathBuf>, schema: SchemaSource) -> Self {
        Self {
            output_root: output_root.into(),
            schema,
            config: RewriteConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: RewriteConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Rewrites every source, `config.threads` files at a time.
    pub fn run(&self, sources: &[PathBuf]) -> Result<RewriteSummary> {
        self.config.validate()?;
        fs::create_dir_all(&self.output_root).map_err(|e| RewriteError::destination(&self.output_root, e))?;
        info!(
            output = %self.output_root.display(),
            sources = sources.len(),
            threads = self.config.threads,
            "removing expiration"
        );

        let claimed = self.claim_destinations(sources);
        let rewrite = |(source, duplicate): (&PathBuf, &bool)| {
            let outcome = if *duplicate {
                Err(RewriteError::destination(
                    source,
                    "another source in the batch has the same keyspace, table and generation",
                ))
            } else {
                rewrite_file(source, &self.output_root, &self.schema, &self.config, &self.cancel)
            };
            (source.clone(), outcome)
        };

        let outcomes: Vec<_> = if self.config.threads <= 1 {
            sources.iter().zip(&claimed).map(rewrite).collect()
        } else {
            match rayon::ThreadPoolBuilder::new().num_threads(self.config.threads).build() {
                Ok(pool) => pool.install(|| sources.par_iter().zip(&claimed).map(rewrite).collect()),
                Err(e) => {
                    warn!(error = %e, "cannot start worker pool, rewriting sequentially");
                    sources.iter().zip(&claimed).map(rewrite).collect()
                }
            }
        };

        let mut summary = RewriteSummary::default();
        for (source, outcome) in outcomes {
            summary.record(source, outcome);
        }
        info!(
            rewritten = summary.rewritten.len(),
            failed = summary.failed.len(),
            suspect = summary.suspect.len(),
            partitions = summary.partitions(),
            stripped_cells = summary.stripped_cells(),
            "expiration removal finished"
        );
        Ok(summary)
    }

    /// Flags sources whose destination an earlier source already maps to.
    /// Unparseable names are left for the rewrite to report.
    fn claim_destinations(&self, sources: &[PathBuf]) -> Vec<bool> {
        let mut seen = HashSet::new();
        sources
            .iter()
            .map(|source| match FormatStrategy::from_data_path(source) {
                Ok((descriptor, _)) => {
                    let destination = destination_for(&descriptor, &self.output_root);
                    !seen.insert(destination.path_for(sstable::Component::Data))
                }
                Err(_) => false,
            })
            .collect()
    }
}

/// Rewrites `sources` into `output_root` with expiration removed.
pub fn remove_expiration(
    output_root: &Path,
    sources: &[PathBuf],
    schema: SchemaSource,
    config: &RewriteConfig,
) -> Result<RewriteSummary> {
    TtlRemover::new(output_root, schema).with_config(config.clone()).run(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{clustering, int, legacy_table, modern_table, write_modern, TABLE_CQL};
    use anyhow::Result;
    use rows::{Cell, ClusteringBound, DeletionTime, Expiration, RangeTombstoneMarker, Row, Unfiltered};
    use sstable::{Component, Descriptor, Version};
    use tempfile::tempdir;

    fn expiring_row(c: i32) -> Unfiltered {
        let mut row = Row::new(clustering(c));
        row.push_cell(Cell::expiring("v", 1, int(c), Expiration::new(10, 1_600_000_000)));
        Unfiltered::Row(row)
    }

    fn statement() -> SchemaSource {
        SchemaSource::Statement(TABLE_CQL.to_string())
    }

    fn generation(descriptor: &Descriptor, generation: u64) -> Descriptor {
        Descriptor {
            generation,
            ..descriptor.clone()
        }
    }

    fn data(reader: &sstable::SSTableReader) -> PathBuf {
        reader.descriptor().path_for(Component::Data)
    }

    // ------ Batch ------

    #[test]
    fn malformed_file_does_not_stop_the_batch() -> Result<()> {
        let dir = tempdir()?;
        let good = modern_table(dir.path(), &[(b"a".to_vec(), DeletionTime::LIVE, vec![expiring_row(1)])])?;
        let open = Unfiltered::Marker(RangeTombstoneMarker::bound(
            ClusteringBound::exclusive_start(vec![crate::test_support::ck(2)]),
            DeletionTime::new(1533270605297319, 1533270605),
        ));
        let bad = write_modern(
            &generation(good.descriptor(), 2),
            &[(b"a".to_vec(), DeletionTime::LIVE, vec![open.clone(), open])],
        )?;

        let out = dir.path().join("out");
        let summary = remove_expiration(&out, &[data(&bad), data(&good)], statement(), &RewriteConfig::default())?;
        assert!(!summary.is_success());
        assert_eq!(summary.rewritten.len(), 1);
        assert_eq!(summary.rewritten[0].source, data(&good));
        assert_eq!(summary.stripped_cells(), 1);
        assert_eq!(summary.suspect, vec![data(&bad)]);
        assert!(matches!(
            summary.failed[0].error,
            RewriteError::MalformedRangeTombstone { .. }
        ));
        assert!(!out.join("ks/t/mc-2-big-Data.db").exists());
        assert!(out.join("ks/t/mc-1-big-Data.db").exists());
        Ok(())
    }

    #[test]
    fn parallel_batches_keep_source_order() -> Result<()> {
        let dir = tempdir()?;
        let first = modern_table(dir.path(), &[(b"a".to_vec(), DeletionTime::LIVE, vec![expiring_row(1)])])?;
        let mut sources = vec![data(&first)];
        for generation in 2..6 {
            let d = self::generation(first.descriptor(), generation);
            sources.push(data(&write_modern(&d, &[(b"b".to_vec(), DeletionTime::LIVE, vec![])])?));
        }
        let config = RewriteConfig {
            threads: 3,
            ..RewriteConfig::default()
        };
        let summary = remove_expiration(&dir.path().join("out"), &sources, statement(), &config)?;
        assert!(summary.is_success());
        let rewritten: Vec<_> = summary.rewritten.iter().map(|f| f.source.clone()).collect();
        assert_eq!(rewritten, sources);
        assert_eq!(summary.partitions(), 5);
        Ok(())
    }

    #[test]
    fn legacy_file_without_schema_is_skipped() -> Result<()> {
        let dir = tempdir()?;
        let legacy = legacy_table(dir.path(), &[(b"a".to_vec(), DeletionTime::LIVE, vec![])])?;
        let summary = TtlRemover::new(dir.path().join("out"), SchemaSource::SelfDescribing).run(&[data(&legacy)])?;
        assert_eq!(summary.failed.len(), 1);
        assert!(matches!(
            summary.failed[0].error,
            RewriteError::SchemaUnavailable { .. }
        ));
        assert!(summary.suspect.is_empty());
        Ok(())
    }

    #[test]
    fn colliding_destinations_are_refused() -> Result<()> {
        let dir = tempdir()?;
        let one = Descriptor::new(dir.path().join("a/ks/t"), "ks", "t", Version::Mc, 1);
        let two = one.with_directory(dir.path().join("b/ks/t"));
        write_modern(&one, &[])?;
        write_modern(&two, &[])?;
        let summary = remove_expiration(
            &dir.path().join("out"),
            &[one.path_for(Component::Data), two.path_for(Component::Data)],
            statement(),
            &RewriteConfig::default(),
        )?;
        assert_eq!(summary.rewritten.len(), 1);
        assert_eq!(summary.failed[0].source, two.path_for(Component::Data));
        Ok(())
    }

    #[test]
    fn cancelled_batch_rewrites_nothing() -> Result<()> {
        let dir = tempdir()?;
        let source = modern_table(dir.path(), &[(b"a".to_vec(), DeletionTime::LIVE, vec![])])?;
        let token = CancellationToken::new();
        token.cancel();
        let summary = TtlRemover::new(dir.path().join("out"), statement())
            .with_cancellation(token)
            .run(&[data(&source)])?;
        assert!(summary.rewritten.is_empty());
        assert!(matches!(summary.failed[0].error, RewriteError::Cancelled { .. }));
        Ok(())
    }

    // ------ Batch level errors ------

    #[test]
    fn invalid_config_is_a_batch_error() {
        let config = RewriteConfig {
            buffer_size: 0,
            ..RewriteConfig::default()
        };
        let dir = std::env::temp_dir();
        assert!(matches!(
            remove_expiration(&dir, &[], statement(), &config),
            Err(RewriteError::Config(_))
        ));
    }

    #[test]
    fn unusable_output_root_is_a_batch_error() -> Result<()> {
        let dir = tempdir()?;
        let blocker = dir.path().join("out");
        fs::write(&blocker, b"")?;
        assert!(matches!(
            remove_expiration(&blocker.join("nested"), &[], statement(), &RewriteConfig::default()),
            Err(RewriteError::DestinationUnavailable { .. })
        ));
        Ok(())
    }

    #[test]
    fn empty_batch_succeeds() -> Result<()> {
        let dir = tempdir()?;
        let summary = remove_expiration(dir.path(), &[], statement(), &RewriteConfig::default())?;
        assert!(summary.is_success());
        assert!(summary.rewritten.is_empty());
        Ok(())
    }
}
