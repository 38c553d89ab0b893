//! Serializes transformed partitions into the destination table.

use std::cmp::Ordering;
use std::path::PathBuf;

use rows::{Cell, ColumnData, PartitionUpdate, RangeTombstone, RangeTombstoneMarker, Row, Unfiltered};
use schema::{ClusteringComparator, TableSchema};
use sstable::{Atom, Component, Descriptor, SSTableError, SSTableWriter, SerializationHeader};

use crate::adapter::FormatStrategy;
use crate::config::RewriteConfig;
use crate::error::{Result, RewriteError};

/// Destination side of a rewrite.
///
/// Partitions are appended in source order; [`finish`](RewriteWriter::finish)
/// consumes the writer and publishes the table. A writer dropped before
/// `finish` leaves nothing behind in the destination directory.
pub struct RewriteWriter {
    strategy: FormatStrategy,
    source: PathBuf,
    comparator: ClusteringComparator,
    inner: SSTableWriter,
}

impl RewriteWriter {
    /// `source` is the data file being rewritten; ordering and tombstone
    /// problems found while writing are attributed to it.
    pub fn create(
        strategy: FormatStrategy,
        source: PathBuf,
        destination: &Descriptor,
        schema: &TableSchema,
        header: Option<SerializationHeader>,
        expected_keys: u64,
        config: &RewriteConfig,
    ) -> Result<Self> {
        let inner = SSTableWriter::create(
            destination,
            schema.partitioner(),
            header,
            expected_keys,
            config.writer_options(),
        )
        .map_err(|e| RewriteError::destination(&destination.directory, e))?;
        Ok(Self {
            strategy,
            source,
            comparator: schema.comparator().clone(),
            inner,
        })
    }

    pub fn descriptor(&self) -> &Descriptor {
        self.inner.descriptor()
    }

    pub fn partition_count(&self) -> u64 {
        self.inner.partition_count()
    }

    /// Writes one partition, including partitions with nothing but a key.
    pub fn append(&mut self, partition: PartitionUpdate) -> Result<()> {
        self.inner
            .begin_partition(&partition.key, &partition.deletion)
            .map_err(|e| self.error(e))?;
        match self.strategy {
            FormatStrategy::Modern => self.append_modern(partition)?,
            FormatStrategy::Legacy => self.append_legacy(&partition)?,
        }
        self.inner.end_partition().map_err(|e| self.error(e))
    }

    /// Publishes every component and returns the destination descriptor.
    pub fn finish(self) -> Result<Descriptor> {
        let directory = self.inner.descriptor().directory.clone();
        self.inner
            .finish()
            .map_err(|e| RewriteError::destination(&directory, e))
    }

    /// Discards the destination.
    pub fn abort(self) {
        self.inner.abort();
    }

    fn append_modern(&mut self, partition: PartitionUpdate) -> Result<()> {
        let mut markers = self.markers(&partition)?.into_iter().peekable();
        let PartitionUpdate { static_row, rows, .. } = partition;

        if let Some(row) = static_row {
            self.write_unfiltered(&Unfiltered::Row(row))?;
        }
        for row in rows {
            while let Some(marker) = markers.next_if(|m| {
                self.comparator.compare_bound_to_clustering(&m.position(), &row.clustering) == Ordering::Less
            }) {
                self.write_unfiltered(&Unfiltered::Marker(marker))?;
            }
            self.write_unfiltered(&Unfiltered::Row(row))?;
        }
        for marker in markers {
            self.write_unfiltered(&Unfiltered::Marker(marker))?;
        }
        Ok(())
    }

    /// Turns the partition's tombstones into bound markers, merging a close
    /// and the next open at the same position into a boundary.
    fn markers(&self, partition: &PartitionUpdate) -> Result<Vec<RangeTombstoneMarker>> {
        let mut markers: Vec<RangeTombstoneMarker> = Vec::with_capacity(partition.range_tombstones.len() * 2);
        let mut previous: Option<&RangeTombstone> = None;
        for rt in &partition.range_tombstones {
            let adjacent = match previous {
                None => false,
                Some(prev) => match self.comparator.compare_bounds(&prev.end, &rt.start) {
                    Ordering::Less => false,
                    Ordering::Equal if prev.end.values == rt.start.values => true,
                    _ => {
                        return Err(RewriteError::malformed(
                            &self.source,
                            &partition.key,
                            format!("range tombstone {:?} overlaps the one ending at {:?}", rt.start, prev.end),
                        ))
                    }
                },
            };
            if adjacent {
                if let Some(RangeTombstoneMarker::Bound { bound, deletion }) = markers.pop() {
                    markers.push(RangeTombstoneMarker::boundary(
                        bound.values,
                        bound.kind.is_inclusive(),
                        deletion,
                        rt.deletion,
                    ));
                }
            } else {
                markers.push(RangeTombstoneMarker::bound(rt.start.clone(), rt.deletion));
            }
            markers.push(RangeTombstoneMarker::bound(rt.end.clone(), rt.deletion));
            previous = Some(rt);
        }
        Ok(markers)
    }

    fn append_legacy(&mut self, partition: &PartitionUpdate) -> Result<()> {
        let mut tombstones = partition.range_tombstones.iter().peekable();
        if let Some(row) = &partition.static_row {
            self.write_row_atoms(row)?;
        }
        for row in &partition.rows {
            while let Some(rt) = tombstones.next_if(|rt| {
                self.comparator.compare_bound_to_clustering(&rt.start, &row.clustering) == Ordering::Less
            }) {
                self.write_atom(&Atom::RangeTombstone(rt.clone()))?;
            }
            self.write_row_atoms(row)?;
        }
        for rt in tombstones {
            self.write_atom(&Atom::RangeTombstone(rt.clone()))?;
        }
        Ok(())
    }

    /// A row marker when the row has liveness or a deletion, then one atom
    /// per cell. Complex column deletions have no legacy encoding.
    fn write_row_atoms(&mut self, row: &Row) -> Result<()> {
        if !row.liveness.is_empty() || !row.deletion.is_live() {
            self.write_atom(&Atom::RowMarker {
                clustering: row.clustering.clone(),
                liveness: row.liveness,
                deletion: row.deletion,
            })?;
        }
        for data in &row.columns {
            if let ColumnData::Complex(complex) = data {
                if !complex.deletion.is_live() {
                    return Err(RewriteError::destination(
                        &self.inner.descriptor().path_for(Component::Data),
                        format!("column {} carries a collection deletion legacy tables cannot store", complex.column),
                    ));
                }
            }
            for cell in data.cells() {
                self.write_cell_atom(row, cell)?;
            }
        }
        Ok(())
    }

    fn write_cell_atom(&mut self, row: &Row, cell: &Cell) -> Result<()> {
        self.write_atom(&Atom::Cell {
            clustering: row.clustering.clone(),
            cell: cell.clone(),
        })
    }

    fn write_atom(&mut self, atom: &Atom) -> Result<()> {
        self.inner.write_atom(atom).map_err(|e| self.error(e))
    }

    fn write_unfiltered(&mut self, unfiltered: &Unfiltered) -> Result<()> {
        self.inner.write_unfiltered(unfiltered).map_err(|e| self.error(e))
    }

    fn error(&self, err: SSTableError) -> RewriteError {
        match err {
            SSTableError::OutOfOrder { .. } => RewriteError::CorruptSource {
                path: self.source.clone(),
                offset: 0,
                reason: "partitions are not in partitioner order".to_string(),
            },
            other => RewriteError::destination(&self.inner.descriptor().path_for(Component::Data), other),
        }
    }
}
