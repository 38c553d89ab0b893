use crate::deletion::DeletionTime;
use crate::marker::{RangeTombstone, RangeTombstoneMarker};
use crate::row::Row;

/// One entry of a partition's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unfiltered {
    Row(Row),
    Marker(RangeTombstoneMarker),
}

impl Unfiltered {
    pub fn is_row(&self) -> bool {
        matches!(self, Unfiltered::Row(_))
    }
}

/// A fully materialized partition ready to be written.
///
/// Rows are kept in the order they are added, which must be clustering order;
/// range tombstones are kept in start-bound order. The static row, when
/// present, is held apart and always written first.
///
/// The buffer tracks an approximate byte size (key, values, paths) so callers
/// can report how large the partition in flight is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionUpdate {
    pub key: Vec<u8>,
    pub deletion: DeletionTime,
    pub static_row: Option<Row>,
    pub rows: Vec<Row>,
    pub range_tombstones: Vec<RangeTombstone>,
    approx_size: usize,
}

impl PartitionUpdate {
    pub fn new(key: Vec<u8>, deletion: DeletionTime) -> Self {
        let approx_size = key.len();
        Self {
            key,
            deletion,
            static_row: None,
            rows: Vec::new(),
            range_tombstones: Vec::new(),
            approx_size,
        }
    }

    /// Appends a row; a static row replaces the partition's static row.
    pub fn add_row(&mut self, row: Row) {
        self.approx_size = self.approx_size.saturating_add(row_size(&row));
        if row.is_static() {
            self.static_row = Some(row);
        } else {
            self.rows.push(row);
        }
    }

    pub fn add_range_tombstone(&mut self, rt: RangeTombstone) {
        let bytes: usize = rt
            .start
            .values
            .iter()
            .chain(rt.end.values.iter())
            .map(Vec::len)
            .sum();
        self.approx_size = self.approx_size.saturating_add(bytes);
        self.range_tombstones.push(rt);
    }

    /// Number of regular rows (the static row is not counted).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// `true` when the partition holds nothing but its key and deletion.
    pub fn is_empty(&self) -> bool {
        self.static_row.is_none() && self.rows.is_empty() && self.range_tombstones.is_empty()
    }

    /// Approximate byte size of keys, clustering values, paths and cell values.
    pub fn approx_size(&self) -> usize {
        self.approx_size
    }
}

fn row_size(row: &Row) -> usize {
    let clustering: usize = row.clustering.values().iter().map(Vec::len).sum();
    let cells: usize = row
        .cells()
        .map(|c| c.value.len() + c.path.as_ref().map_or(0, Vec::len))
        .sum();
    clustering + cells
}
