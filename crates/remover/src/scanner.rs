//! Lazy, single-pass walk over the partitions of a source file.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use rows::{Cell, Clustering, ClusteringBound, DeletionTime, RangeTombstoneMarker, Row, Unfiltered};
use schema::{ColumnKind, TableSchema};
use sstable::{Atom, DataCursor, ModernCodec, SSTableReader};

use crate::adapter::{missing_header, FormatStrategy};
use crate::config::RewriteConfig;
use crate::error::{Result, RewriteError};

enum Decoder {
    /// Rebuilds rows from consecutive atoms sharing a clustering.
    Legacy { building: Option<Row> },
    Modern(ModernCodec),
}

/// Streams the partitions of one data file.
///
/// Each partition's entries are decoded only when pulled. A partition that
/// is abandoned before its end is skipped by the next call to
/// [`next_partition`](PartitionScanner::next_partition). The data file is
/// closed once exhausted, on [`close`](PartitionScanner::close) or on drop.
pub struct PartitionScanner {
    cursor: DataCursor,
    decoder: Decoder,
    schema: Arc<TableSchema>,
    pending: VecDeque<Unfiltered>,
    partition_done: bool,
}

impl PartitionScanner {
    pub fn open(
        source: &SSTableReader,
        strategy: FormatStrategy,
        schema: Arc<TableSchema>,
        config: &RewriteConfig,
    ) -> Result<Self> {
        let decoder = match strategy {
            FormatStrategy::Legacy => Decoder::Legacy { building: None },
            FormatStrategy::Modern => {
                let header = source.stats().header.clone().ok_or_else(|| missing_header(source))?;
                let codec = ModernCodec::new(header).map_err(|e| {
                    RewriteError::from_source(&source.descriptor().path_for(sstable::Component::Data), e)
                })?;
                Decoder::Modern(codec)
            }
        };
        let cursor = source
            .data_cursor(config.disk_access_mode, config.buffer_size)
            .map_err(|e| RewriteError::from_source(&source.descriptor().path_for(sstable::Component::Data), e))?;
        Ok(Self {
            cursor,
            decoder,
            schema,
            pending: VecDeque::new(),
            partition_done: true,
        })
    }

    pub fn path(&self) -> &Path {
        self.cursor.path()
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Moves to the next partition, `None` once the file is exhausted.
    pub fn next_partition(&mut self) -> Result<Option<ScannedPartition<'_>>> {
        self.pending.clear();
        if let Decoder::Legacy { building } = &mut self.decoder {
            *building = None;
        }
        let header = self
            .cursor
            .next_partition()
            .map_err(|e| RewriteError::from_source(self.cursor.path(), e))?;
        match header {
            Some(h) => {
                self.partition_done = false;
                Ok(Some(ScannedPartition {
                    key: h.key,
                    deletion: h.deletion,
                    scanner: self,
                }))
            }
            None => Ok(None),
        }
    }

    /// Releases the data file early. Safe to call more than once.
    pub fn close(&mut self) {
        self.cursor.close();
        self.pending.clear();
        self.partition_done = true;
    }

    fn next_unfiltered(&mut self) -> Result<Option<Unfiltered>> {
        loop {
            if let Some(u) = self.pending.pop_front() {
                return Ok(Some(u));
            }
            if self.partition_done {
                return Ok(None);
            }
            let frame = self
                .cursor
                .next_record()
                .map_err(|e| RewriteError::from_source(self.cursor.path(), e))?;
            let path = self.cursor.path();
            match (&mut self.decoder, frame) {
                (Decoder::Modern(codec), Some(frame)) => {
                    let u = codec
                        .decode(&frame, path)
                        .map_err(|e| RewriteError::from_source(path, e))?;
                    return Ok(Some(u));
                }
                (Decoder::Modern(_), None) => {
                    self.partition_done = true;
                }
                (Decoder::Legacy { building }, Some(frame)) => {
                    let atom = Atom::decode(&frame, path).map_err(|e| RewriteError::from_source(path, e))?;
                    absorb_atom(&self.schema, path, building, &mut self.pending, atom)?;
                }
                (Decoder::Legacy { building }, None) => {
                    self.partition_done = true;
                    if let Some(row) = building.take() {
                        self.pending.push_back(Unfiltered::Row(row));
                    }
                }
            }
        }
    }
}

/// One partition of a [`PartitionScanner`]. Entries come out in file order.
pub struct ScannedPartition<'a> {
    key: Vec<u8>,
    deletion: DeletionTime,
    scanner: &'a mut PartitionScanner,
}

impl ScannedPartition<'_> {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn deletion(&self) -> DeletionTime {
        self.deletion
    }

    pub fn next_unfiltered(&mut self) -> Result<Option<Unfiltered>> {
        self.scanner.next_unfiltered()
    }
}

impl Iterator for ScannedPartition<'_> {
    type Item = Result<Unfiltered>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_unfiltered().transpose()
    }
}

/// Folds one legacy atom into the row being built. Completed rows and the
/// open/close markers of range tombstone atoms are queued on `out`.
fn absorb_atom(
    schema: &TableSchema,
    path: &Path,
    building: &mut Option<Row>,
    out: &mut VecDeque<Unfiltered>,
    atom: Atom,
) -> Result<()> {
    match atom {
        Atom::RangeTombstone(rt) => {
            check_bound(schema, path, &rt.start)?;
            check_bound(schema, path, &rt.end)?;
            if let Some(row) = building.take() {
                out.push_back(Unfiltered::Row(row));
            }
            out.push_back(Unfiltered::Marker(RangeTombstoneMarker::bound(rt.start, rt.deletion)));
            out.push_back(Unfiltered::Marker(RangeTombstoneMarker::bound(rt.end, rt.deletion)));
        }
        Atom::RowMarker {
            clustering,
            liveness,
            deletion,
        } => {
            start_row(schema, path, building, out, clustering)?;
            if let Some(row) = building.as_mut() {
                row.liveness = liveness;
                row.deletion = deletion;
            }
        }
        Atom::Cell { clustering, cell } => {
            check_cell(schema, path, &clustering, &cell)?;
            start_row(schema, path, building, out, clustering)?;
            if let Some(row) = building.as_mut() {
                row.push_cell(cell);
            }
        }
    }
    Ok(())
}

/// Makes `building` the row for `clustering`, queuing the previous row when
/// the clustering changes.
fn start_row(
    schema: &TableSchema,
    path: &Path,
    building: &mut Option<Row>,
    out: &mut VecDeque<Unfiltered>,
    clustering: Clustering,
) -> Result<()> {
    if building.as_ref().map(|r| &r.clustering) == Some(&clustering) {
        return Ok(());
    }
    check_clustering(schema, path, &clustering)?;
    if let Some(done) = building.take() {
        out.push_back(Unfiltered::Row(done));
    }
    *building = Some(Row::new(clustering));
    Ok(())
}

fn mismatch(schema: &TableSchema, path: &Path, reason: String) -> RewriteError {
    RewriteError::schema(
        schema.qualified_name(),
        format!("{} does not match the schema: {}", path.display(), reason),
    )
}

fn check_clustering(schema: &TableSchema, path: &Path, clustering: &Clustering) -> Result<()> {
    if let Clustering::Regular(values) = clustering {
        if values.len() != schema.clustering_size() {
            return Err(mismatch(
                schema,
                path,
                format!("row has {} clustering values, table has {}", values.len(), schema.clustering_size()),
            ));
        }
    }
    Ok(())
}

fn check_bound(schema: &TableSchema, path: &Path, bound: &ClusteringBound) -> Result<()> {
    if bound.values.len() > schema.clustering_size() {
        return Err(mismatch(
            schema,
            path,
            format!(
                "range tombstone bound has {} values, table has {} clustering columns",
                bound.values.len(),
                schema.clustering_size()
            ),
        ));
    }
    Ok(())
}

fn check_cell(schema: &TableSchema, path: &Path, clustering: &Clustering, cell: &Cell) -> Result<()> {
    let def = schema
        .column(&cell.column)
        .ok_or_else(|| mismatch(schema, path, format!("unknown column {}", cell.column)))?;
    let kind_ok = match def.kind {
        ColumnKind::Static => clustering.is_static(),
        ColumnKind::Regular => !clustering.is_static(),
        ColumnKind::PartitionKey(_) | ColumnKind::Clustering(_) => false,
    };
    if !kind_ok {
        return Err(mismatch(
            schema,
            path,
            format!("column {} cannot hold a cell in this row", cell.column),
        ));
    }
    if cell.path.is_some() && !def.is_complex() {
        return Err(mismatch(
            schema,
            path,
            format!("column {} is not a collection but the cell has a path", cell.column),
        ));
    }
    Ok(())
}
