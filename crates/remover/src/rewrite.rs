//! Rewrites one source file: count, scan, transform, reconcile, write.

use std::fs;
use std::path::{Path, PathBuf};

use rows::{PartitionUpdate, Unfiltered};
use serde::Serialize;
use sstable::{Component, Descriptor, SSTableReader};
use tracing::{debug, info};

use crate::adapter::FormatStrategy;
use crate::cancel::CancellationToken;
use crate::config::RewriteConfig;
use crate::error::{Result, RewriteError};
use crate::key_counter::count_keys;
use crate::reconciler::RangeTombstoneReconciler;
use crate::resolver::SchemaSource;
use crate::scanner::PartitionScanner;
use crate::transform::RowTransform;
use crate::writer::RewriteWriter;

/// Outcome of one successful rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewrittenFile {
    pub source: PathBuf,
    /// `Data.db` of the rewritten table.
    pub destination: PathBuf,
    pub version: String,
    pub partitions: u64,
    pub rows: u64,
    pub range_tombstones: u64,
    /// Cells whose expiration was removed.
    pub stripped_cells: u64,
    /// Rows whose primary key liveness lost its expiration.
    pub stripped_row_markers: u64,
}

/// Where the destination of `descriptor` goes: `<output_root>/<ks>/<table>/`,
/// same version and generation.
pub fn destination_for(descriptor: &Descriptor, output_root: &Path) -> Descriptor {
    descriptor.with_directory(output_root.join(&descriptor.keyspace).join(&descriptor.table))
}

/// Rewrites the table whose `Data.db` is `source` into `output_root`.
pub fn rewrite_file(
    source: &Path,
    output_root: &Path,
    schema_source: &SchemaSource,
    config: &RewriteConfig,
    cancel: &CancellationToken,
) -> Result<RewrittenFile> {
    let (descriptor, strategy) = FormatStrategy::from_data_path(source)?;
    if cancel.is_cancelled() {
        return Err(RewriteError::Cancelled {
            path: source.to_path_buf(),
        });
    }

    let reader = SSTableReader::open(&descriptor).map_err(|e| RewriteError::from_source(source, e))?;
    let schema = schema_source.resolve(&reader, strategy)?;
    if let Some(ttl) = schema.default_ttl.filter(|ttl| *ttl > 0) {
        debug!(
            table = %schema.qualified_name(),
            default_ttl = ttl,
            "table has a default ttl; only existing cells become permanent"
        );
    }

    let expected = count_keys(&descriptor)?;
    let destination = destination_for(&descriptor, output_root);
    prepare_destination(&descriptor, &destination)?;

    info!(
        source = %source.display(),
        format = %strategy,
        version = %descriptor.version,
        partitions = expected,
        "rewriting sstable"
    );

    let mut scanner = strategy.open_scanner(&reader, schema.clone(), config)?;
    let writer = strategy.create_writer(&reader, &destination, &schema, expected, config)?;
    let (written, counts) = stream(source, &mut scanner, writer, cancel)?;

    if config.verify {
        let actual = count_keys(&written).map_err(|e| {
            remove_table(&written);
            e
        })?;
        if actual != expected {
            remove_table(&written);
            return Err(RewriteError::Verification {
                path: written.path_for(Component::Data),
                expected,
                actual,
            });
        }
    }

    let file = RewrittenFile {
        source: source.to_path_buf(),
        destination: written.path_for(Component::Data),
        version: descriptor.version.to_string(),
        partitions: counts.partitions,
        rows: counts.transform.rows,
        range_tombstones: counts.range_tombstones,
        stripped_cells: counts.transform.stripped_cells,
        stripped_row_markers: counts.transform.stripped_row_markers,
    };
    info!(
        source = %source.display(),
        destination = %file.destination.display(),
        partitions = file.partitions,
        stripped_cells = file.stripped_cells,
        "sstable rewritten"
    );
    Ok(file)
}

/// Creates the destination directory and refuses it when it resolves to the
/// directory of the source table, whatever spelling the output root used.
fn prepare_destination(source: &Descriptor, destination: &Descriptor) -> Result<()> {
    let target = &destination.directory;
    fs::create_dir_all(target).map_err(|e| RewriteError::destination(target, e))?;
    let target_dir = fs::canonicalize(target).map_err(|e| RewriteError::destination(target, e))?;
    let source_dir = if source.directory.as_os_str().is_empty() {
        Path::new(".")
    } else {
        source.directory.as_path()
    };
    let source_dir = fs::canonicalize(source_dir).map_err(|e| {
        RewriteError::destination(target, format!("cannot resolve {}: {}", source_dir.display(), e))
    })?;
    if target_dir == source_dir {
        return Err(RewriteError::destination(target, "destination is the source table itself"));
    }
    Ok(())
}

/// Copies every partition from `scanner` into `writer` and publishes the
/// destination. On any failure the writer is aborted, so no temporary
/// component outlives the call.
fn stream(
    source: &Path,
    scanner: &mut PartitionScanner,
    mut writer: RewriteWriter,
    cancel: &CancellationToken,
) -> Result<(Descriptor, Counts)> {
    let mut counts = Counts::default();
    let copied = copy_partitions(source, scanner, &mut writer, &mut counts, cancel);
    scanner.close();
    if let Err(e) = copied {
        writer.abort();
        return Err(e);
    }
    Ok((writer.finish()?, counts))
}

#[derive(Debug, Default)]
struct Counts {
    partitions: u64,
    range_tombstones: u64,
    transform: RowTransform,
}

fn copy_partitions(
    source: &Path,
    scanner: &mut PartitionScanner,
    writer: &mut RewriteWriter,
    counts: &mut Counts,
    cancel: &CancellationToken,
) -> Result<()> {
    while let Some(mut partition) = scanner.next_partition()? {
        if cancel.is_cancelled() {
            return Err(RewriteError::Cancelled {
                path: source.to_path_buf(),
            });
        }
        let mut update = PartitionUpdate::new(partition.key().to_vec(), partition.deletion());
        let mut reconciler = RangeTombstoneReconciler::new();
        while let Some(entry) = partition.next_unfiltered()? {
            match entry {
                Unfiltered::Row(row) => update.add_row(counts.transform.apply(row)),
                Unfiltered::Marker(marker) => {
                    let completed = reconciler
                        .accept(&marker)
                        .map_err(|e| RewriteError::malformed(source, &update.key, e))?;
                    if let Some(rt) = completed {
                        counts.range_tombstones += 1;
                        update.add_range_tombstone(rt);
                    }
                }
            }
        }
        reconciler
            .finish()
            .map_err(|e| RewriteError::malformed(source, &update.key, e))?;
        writer.append(update)?;
        counts.partitions += 1;
    }
    Ok(())
}

fn remove_table(descriptor: &Descriptor) {
    for component in Component::ALL {
        let _ = fs::remove_file(descriptor.path_for(component));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ck, clustering, int, legacy_table, modern_table, table_schema, write_modern, TABLE_CQL};
    use anyhow::Result;
    use rows::{
        Cell, CellState, Clustering, ClusteringBound, ColumnData, ComplexColumn, DeletionTime, Expiration,
        LivenessInfo, RangeTombstoneMarker, Row,
    };
    use std::sync::Arc;
    use sstable::{Atom, DiskAccessMode, ModernCodec, Version};
    use tempfile::tempdir;

    const PARTITION_DELETION: DeletionTime = DeletionTime {
        marked_for_delete_at: 1533270606330537,
        local_deletion_time: 1533270605,
    };
    const RT_DELETION: DeletionTime = DeletionTime {
        marked_for_delete_at: 1533270605297319,
        local_deletion_time: 1533270605,
    };

    fn statement() -> SchemaSource {
        SchemaSource::Statement(TABLE_CQL.to_string())
    }

    fn run(source: &Path, out: &Path) -> crate::Result<RewrittenFile> {
        rewrite_file(source, out, &statement(), &RewriteConfig::default(), &CancellationToken::new())
    }

    fn read_modern(d: &Descriptor) -> Result<Vec<(Vec<u8>, DeletionTime, Vec<Unfiltered>)>> {
        let reader = SSTableReader::open(d)?;
        let codec = ModernCodec::new(reader.stats().header.clone().expect("header"))?;
        let mut cursor = reader.data_cursor(DiskAccessMode::Mmap, 4096)?;
        let mut out = Vec::new();
        while let Some(p) = cursor.next_partition()? {
            let mut entries = Vec::new();
            while let Some(frame) = cursor.next_record()? {
                entries.push(codec.decode(&frame, cursor.path())?);
            }
            out.push((p.key, p.deletion, entries));
        }
        Ok(out)
    }

    fn scenario_row() -> Row {
        let mut row = Row::new(clustering(1));
        row.liveness = LivenessInfo::expiring(1533270600000000, Expiration::new(10, 1533270610));
        row.push_cell(Cell::expiring("v", 1533270600000000, int(7), Expiration::new(10, 1533270610)));
        row.push_cell(Cell::tombstone("d", 1533270605000000, 1533270605));
        row
    }

    fn scenario_markers() -> (Unfiltered, Unfiltered) {
        (
            Unfiltered::Marker(RangeTombstoneMarker::bound(
                ClusteringBound::exclusive_start(vec![ck(2)]),
                RT_DELETION,
            )),
            Unfiltered::Marker(RangeTombstoneMarker::bound(
                ClusteringBound::inclusive_end(vec![ck(4)]),
                RT_DELETION,
            )),
        )
    }

    // ------ Concrete scenario ------

    #[test]
    fn expiring_cell_tombstone_and_range_tombstone() -> Result<()> {
        let dir = tempdir()?;
        let (open, close) = scenario_markers();
        let source = modern_table(
            dir.path(),
            &[
                (b"a".to_vec(), DeletionTime::LIVE, vec![Unfiltered::Row(scenario_row()), open, close]),
                (b"b".to_vec(), PARTITION_DELETION, vec![]),
            ],
        )?;
        let out = dir.path().join("out");
        let file = run(&source.descriptor().path_for(Component::Data), &out)?;
        assert_eq!(file.partitions, 2);
        assert_eq!(file.stripped_cells, 1);
        assert_eq!(file.stripped_row_markers, 1);
        assert_eq!(file.range_tombstones, 1);
        assert_eq!(file.destination, out.join("ks/t/mc-1-big-Data.db"));

        let written = destination_for(source.descriptor(), &out);
        let partitions = read_modern(&written)?;
        assert_eq!(partitions.len(), 2);

        let (_, deletion, entries) = &partitions[0];
        assert!(deletion.is_live());
        assert_eq!(entries.len(), 3);
        let Unfiltered::Row(row) = &entries[0] else { panic!("row first") };
        let v = row.cell("v").expect("v");
        assert_eq!(v.state, CellState::Live);
        assert_eq!((v.timestamp, v.value.clone()), (1533270600000000, int(7)));
        assert_eq!(row.liveness, LivenessInfo::live(1533270600000000));
        assert_eq!(
            row.cell("d").map(|c| c.state),
            Some(CellState::Tombstone {
                local_deletion_time: 1533270605
            })
        );
        let (open, close) = scenario_markers();
        assert_eq!(entries[1], open);
        assert_eq!(entries[2], close);

        let (key, deletion, entries) = &partitions[1];
        assert_eq!(key, b"b");
        assert_eq!(*deletion, PARTITION_DELETION);
        assert!(entries.is_empty());

        let stats = SSTableReader::open(&written)?.stats().clone();
        assert_eq!(stats.expiring_cell_count, 0);
        assert_eq!(stats.max_ttl, 0);
        assert_eq!(stats.partition_count, 2);
        Ok(())
    }

    #[test]
    fn rewriting_a_rewrite_changes_nothing() -> Result<()> {
        let dir = tempdir()?;
        let (open, close) = scenario_markers();
        let source = modern_table(
            dir.path(),
            &[(b"a".to_vec(), DeletionTime::LIVE, vec![Unfiltered::Row(scenario_row()), open, close])],
        )?;
        let first = run(&source.descriptor().path_for(Component::Data), &dir.path().join("once"))?;
        let second = run(&first.destination, &dir.path().join("twice"))?;
        assert_eq!(second.stripped_cells, 0);

        let once = read_modern(&destination_for(source.descriptor(), &dir.path().join("once")))?;
        let twice = read_modern(&destination_for(source.descriptor(), &dir.path().join("twice")))?;
        assert_eq!(once, twice);
        Ok(())
    }

    #[test]
    fn static_complex_deleted_rows_and_boundaries_survive() -> Result<()> {
        let dir = tempdir()?;
        let exp = Expiration::new(10, 1533270610);
        let first = DeletionTime::new(20, 1533270601);
        let second = DeletionTime::new(30, 1533270602);

        let mut static_row = Row::new(Clustering::Static);
        static_row.push_cell(Cell::expiring("s", 3, int(9), exp));

        let mut deleted = Row::new(clustering(1));
        deleted.deletion = DeletionTime::new(11, 12);
        let mut tags = ComplexColumn::new("tags");
        tags.deletion = DeletionTime::new(5, 6);
        tags.cells.push(Cell::expiring("tags", 7, Vec::new(), exp).with_path(b"x".to_vec()));
        tags.cells.push(Cell::tombstone("tags", 8, 1533270605).with_path(b"y".to_vec()));
        deleted.push_complex(tags);

        let mut covered = Row::new(clustering(3));
        covered.push_cell(Cell::expiring("v", 9, int(3), exp));

        let open = RangeTombstoneMarker::bound(ClusteringBound::inclusive_start(vec![ck(2)]), first);
        let boundary = RangeTombstoneMarker::boundary(vec![ck(4)], false, first, second);
        let close = RangeTombstoneMarker::bound(ClusteringBound::inclusive_end(vec![ck(6)]), second);

        let source = modern_table(
            dir.path(),
            &[(
                b"a".to_vec(),
                DeletionTime::LIVE,
                vec![
                    Unfiltered::Row(static_row),
                    Unfiltered::Row(deleted),
                    Unfiltered::Marker(open.clone()),
                    Unfiltered::Row(covered),
                    Unfiltered::Marker(boundary.clone()),
                    Unfiltered::Marker(close.clone()),
                ],
            )],
        )?;
        let out = dir.path().join("out");
        let file = run(&source.descriptor().path_for(Component::Data), &out)?;
        assert_eq!(file.stripped_cells, 3);
        assert_eq!(file.range_tombstones, 2);
        assert_eq!(file.rows, 3);

        let partitions = read_modern(&destination_for(source.descriptor(), &out))?;
        let (_, _, entries) = &partitions[0];
        assert_eq!(entries.len(), 6);

        let Unfiltered::Row(static_row) = &entries[0] else { panic!("static row first") };
        assert!(static_row.is_static());
        assert_eq!(static_row.cell("s"), Some(&Cell::live("s", 3, int(9))));

        let Unfiltered::Row(deleted) = &entries[1] else { panic!("deleted row second") };
        assert_eq!(deleted.deletion, DeletionTime::new(11, 12));
        let Some(ColumnData::Complex(tags)) = deleted.column("tags") else { panic!("complex tags") };
        assert_eq!(tags.deletion, DeletionTime::new(5, 6));
        assert_eq!(
            tags.cells,
            vec![
                Cell::live("tags", 7, Vec::new()).with_path(b"x".to_vec()),
                Cell::tombstone("tags", 8, 1533270605).with_path(b"y".to_vec()),
            ]
        );

        assert_eq!(entries[2], Unfiltered::Marker(open));
        let Unfiltered::Row(covered) = &entries[3] else { panic!("covered row inside the tombstone") };
        assert_eq!(covered.cell("v"), Some(&Cell::live("v", 9, int(3))));
        assert_eq!(entries[4], Unfiltered::Marker(boundary));
        assert_eq!(entries[5], Unfiltered::Marker(close));
        Ok(())
    }

    // ------ Legacy ------

    #[test]
    fn legacy_scenario_keeps_tombstones() -> Result<()> {
        let dir = tempdir()?;
        let rt = rows::RangeTombstone::new(
            ClusteringBound::exclusive_start(vec![ck(2)]),
            ClusteringBound::inclusive_end(vec![ck(4)]),
            RT_DELETION,
        );
        let atoms = vec![
            Atom::Cell {
                clustering: clustering(1),
                cell: Cell::expiring("v", 10, int(7), Expiration::new(10, 1533270610)),
            },
            Atom::Cell {
                clustering: clustering(1),
                cell: Cell::tombstone("d", 11, 1533270605),
            },
            Atom::RangeTombstone(rt.clone()),
        ];
        let source = legacy_table(
            dir.path(),
            &[
                (b"a".to_vec(), DeletionTime::LIVE, atoms),
                (b"b".to_vec(), PARTITION_DELETION, vec![]),
            ],
        )?;
        let out = dir.path().join("out");
        let file = run(&source.descriptor().path_for(Component::Data), &out)?;
        assert_eq!(file.partitions, 2);
        assert_eq!(file.stripped_cells, 1);
        assert!(out.join("ks/t/ks-t-ka-1-Data.db").exists());

        let written = destination_for(source.descriptor(), &out);
        let reader = SSTableReader::open(&written)?;
        let mut cursor = reader.data_cursor(DiskAccessMode::Standard, 4096)?;
        let p = cursor.next_partition()?.expect("a");
        assert!(p.deletion.is_live());
        let mut atoms = Vec::new();
        while let Some(frame) = cursor.next_record()? {
            atoms.push(Atom::decode(&frame, cursor.path())?);
        }
        assert_eq!(
            atoms,
            vec![
                Atom::Cell {
                    clustering: clustering(1),
                    cell: Cell::live("v", 10, int(7)),
                },
                Atom::Cell {
                    clustering: clustering(1),
                    cell: Cell::tombstone("d", 11, 1533270605),
                },
                Atom::RangeTombstone(rt),
            ]
        );
        assert_eq!(cursor.next_partition()?.map(|p| p.deletion), Some(PARTITION_DELETION));
        Ok(())
    }

    // ------ Failures ------

    #[test]
    fn double_open_is_malformed_and_leaves_no_output() -> Result<()> {
        let dir = tempdir()?;
        let (open, _) = scenario_markers();
        let source = modern_table(dir.path(), &[(b"a".to_vec(), DeletionTime::LIVE, vec![open.clone(), open])])?;
        let out = dir.path().join("out");
        let err = run(&source.descriptor().path_for(Component::Data), &out).unwrap_err();
        assert!(matches!(err, RewriteError::MalformedRangeTombstone { .. }));
        assert!(err.marks_source_suspect());
        assert_eq!(fs::read_dir(out.join("ks/t"))?.count(), 0);
        Ok(())
    }

    #[test]
    fn cancelled_token_stops_before_writing() -> Result<()> {
        let dir = tempdir()?;
        let source = modern_table(dir.path(), &[(b"a".to_vec(), DeletionTime::LIVE, vec![])])?;
        let token = CancellationToken::new();
        token.cancel();
        let err = rewrite_file(
            &source.descriptor().path_for(Component::Data),
            &dir.path().join("out"),
            &statement(),
            &RewriteConfig::default(),
            &token,
        )
        .unwrap_err();
        assert!(matches!(err, RewriteError::Cancelled { .. }));
        Ok(())
    }

    #[test]
    fn output_root_equal_to_source_root_is_refused() -> Result<()> {
        let dir = tempdir()?;
        let source = modern_table(dir.path(), &[])?;
        let err = run(&source.descriptor().path_for(Component::Data), &dir.path().join("source")).unwrap_err();
        assert!(matches!(err, RewriteError::DestinationUnavailable { .. }));
        Ok(())
    }

    #[test]
    fn dotted_output_root_cannot_overwrite_source() -> Result<()> {
        let dir = tempdir()?;
        let source = modern_table(dir.path(), &[(b"a".to_vec(), DeletionTime::LIVE, vec![Unfiltered::Row(scenario_row())])])?;
        let data = source.descriptor().path_for(Component::Data);
        let before = fs::read(&data)?;
        let dotted = dir.path().join("source").join("..").join("source");
        let err = run(&data, &dotted).unwrap_err();
        assert!(matches!(err, RewriteError::DestinationUnavailable { .. }));
        assert_eq!(fs::read(&data)?, before);
        assert!(SSTableReader::open(source.descriptor()).is_ok());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_output_root_cannot_overwrite_source() -> Result<()> {
        let dir = tempdir()?;
        let source = modern_table(dir.path(), &[(b"a".to_vec(), DeletionTime::LIVE, vec![])])?;
        let data = source.descriptor().path_for(Component::Data);
        let before = fs::read(&data)?;
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(dir.path().join("source"), &link)?;
        let err = run(&data, &link).unwrap_err();
        assert!(matches!(err, RewriteError::DestinationUnavailable { .. }));
        assert_eq!(fs::read(&data)?, before);
        Ok(())
    }

    #[test]
    fn cancellation_between_partitions_leaves_no_temporaries() -> Result<()> {
        let dir = tempdir()?;
        let source = modern_table(
            dir.path(),
            &[
                (b"a".to_vec(), DeletionTime::LIVE, vec![Unfiltered::Row(scenario_row())]),
                (b"b".to_vec(), DeletionTime::LIVE, vec![Unfiltered::Row(scenario_row())]),
            ],
        )?;
        let data = source.descriptor().path_for(Component::Data);
        let schema = Arc::new(table_schema()?);
        let config = RewriteConfig::default();
        let destination = destination_for(source.descriptor(), &dir.path().join("out"));
        let mut scanner = FormatStrategy::Modern.open_scanner(&source, schema.clone(), &config)?;
        let mut writer = FormatStrategy::Modern.create_writer(&source, &destination, &schema, 2, &config)?;
        {
            let mut first = scanner.next_partition()?.expect("first partition");
            let mut update = PartitionUpdate::new(first.key().to_vec(), first.deletion());
            while let Some(Unfiltered::Row(row)) = first.next_unfiltered()? {
                update.add_row(row);
            }
            writer.append(update)?;
        }
        assert!(fs::read_dir(&destination.directory)?.count() > 0);

        let token = CancellationToken::new();
        token.cancel();
        let err = stream(&data, &mut scanner, writer, &token).unwrap_err();
        assert!(matches!(err, RewriteError::Cancelled { .. }));
        assert_eq!(fs::read_dir(&destination.directory)?.count(), 0);
        Ok(())
    }

    #[test]
    fn unsupported_version_is_reported() -> Result<()> {
        let dir = tempdir()?;
        let d = Descriptor::new(dir.path().join("ks/t"), "ks", "t", Version::Mc, 1);
        write_modern(&d, &[])?;
        let bogus = dir.path().join("ks/t/zz-1-big-Data.db");
        fs::copy(d.path_for(Component::Data), &bogus)?;
        assert!(matches!(
            run(&bogus, &dir.path().join("out")),
            Err(RewriteError::UnsupportedFormat { .. })
        ));
        Ok(())
    }

    #[test]
    fn digest_mismatch_marks_source_corrupt() -> Result<()> {
        let dir = tempdir()?;
        let source = modern_table(dir.path(), &[(b"a".to_vec(), DeletionTime::LIVE, vec![])])?;
        fs::write(source.descriptor().path_for(Component::Digest), "12345")?;
        let err = run(&source.descriptor().path_for(Component::Data), &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, RewriteError::CorruptSource { .. }));
        Ok(())
    }
}
