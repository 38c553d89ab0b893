use crate::cell::{Cell, ColumnData, ColumnName, ComplexColumn};
use crate::clustering::Clustering;
use crate::deletion::{DeletionTime, LivenessInfo};

/// Data for one clustering key within a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub clustering: Clustering,
    /// Primary-key liveness, independent of the cells.
    pub liveness: LivenessInfo,
    /// Row-level deletion ([`DeletionTime::LIVE`] when the row is not deleted).
    pub deletion: DeletionTime,
    /// Column data in column order.
    pub columns: Vec<ColumnData>,
}

impl Row {
    pub fn new(clustering: Clustering) -> Self {
        Self {
            clustering,
            liveness: LivenessInfo::EMPTY,
            deletion: DeletionTime::LIVE,
            columns: Vec::new(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.clustering.is_static()
    }

    pub fn push_cell(&mut self, cell: Cell) {
        self.columns.push(ColumnData::Cell(cell));
    }

    pub fn push_complex(&mut self, complex: ComplexColumn) {
        self.columns.push(ColumnData::Complex(complex));
    }

    /// Every cell of the row, complex sub-cells included, in column order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.columns.iter().flat_map(|c| c.cells())
    }

    /// Number of cells, complex sub-cells included.
    pub fn cell_count(&self) -> usize {
        self.columns.iter().map(|c| c.cells().count()).sum()
    }

    /// First cell stored for `column`, if any.
    pub fn cell(&self, column: &str) -> Option<&Cell> {
        self.cells().find(|c| c.column.as_ref() == column)
    }

    pub fn column(&self, column: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.column().as_ref() == column)
    }

    /// A row with no liveness, no deletion and no data carries no information.
    pub fn is_empty(&self) -> bool {
        self.liveness.is_empty() && self.deletion.is_live() && self.columns.is_empty()
    }

    /// Names of the columns present in this row.
    pub fn column_names(&self) -> impl Iterator<Item = &ColumnName> {
        self.columns.iter().map(|c| c.column())
    }
}
