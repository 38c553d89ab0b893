use std::sync::Arc;

use crate::deletion::{DeletionTime, Expiration};

/// Column identity as carried by cells. Cheap to clone.
pub type ColumnName = Arc<str>;

/// What a cell says about its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellState {
    /// A live value that never expires.
    Live,
    /// A live value that stops being visible at `Expiration::local_expiration_time`.
    Expiring(Expiration),
    /// A deletion. The cell timestamp is the deletion timestamp.
    Tombstone { local_deletion_time: i32 },
}

/// The value of one column (or one collection element) within a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub column: ColumnName,
    /// Element path for cells of complex columns (`None` for simple columns).
    pub path: Option<Vec<u8>>,
    pub timestamp: i64,
    /// Raw value bytes. Always empty for tombstones.
    pub value: Vec<u8>,
    pub state: CellState,
}

impl Cell {
    pub fn live(column: impl Into<ColumnName>, timestamp: i64, value: Vec<u8>) -> Self {
        Self {
            column: column.into(),
            path: None,
            timestamp,
            value,
            state: CellState::Live,
        }
    }

    pub fn expiring(
        column: impl Into<ColumnName>,
        timestamp: i64,
        value: Vec<u8>,
        expiration: Expiration,
    ) -> Self {
        Self {
            column: column.into(),
            path: None,
            timestamp,
            value,
            state: CellState::Expiring(expiration),
        }
    }

    pub fn tombstone(column: impl Into<ColumnName>, timestamp: i64, local_deletion_time: i32) -> Self {
        Self {
            column: column.into(),
            path: None,
            timestamp,
            value: Vec::new(),
            state: CellState::Tombstone {
                local_deletion_time,
            },
        }
    }

    /// Attaches a collection element path.
    pub fn with_path(mut self, path: Vec<u8>) -> Self {
        self.path = Some(path);
        self
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.state, CellState::Tombstone { .. })
    }

    pub fn is_expiring(&self) -> bool {
        matches!(self.state, CellState::Expiring(_))
    }

    pub fn expiration(&self) -> Option<Expiration> {
        match self.state {
            CellState::Expiring(e) => Some(e),
            _ => None,
        }
    }

    /// Local deletion time of a tombstone, local expiration time of an
    /// expiring cell, `None` for plain live cells.
    pub fn local_deletion_time(&self) -> Option<i32> {
        match self.state {
            CellState::Live => None,
            CellState::Expiring(e) => Some(e.local_expiration_time),
            CellState::Tombstone {
                local_deletion_time,
            } => Some(local_deletion_time),
        }
    }

    /// Turns an expiring cell into a permanently live one. Column, path, value
    /// and timestamp are untouched; tombstones and live cells are returned as is.
    pub fn without_expiration(self) -> Self {
        match self.state {
            CellState::Expiring(_) => Self {
                state: CellState::Live,
                ..self
            },
            _ => self,
        }
    }
}

/// All cells of one multi-cell column plus the column-wide deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexColumn {
    pub column: ColumnName,
    pub deletion: DeletionTime,
    /// Cells in path order.
    pub cells: Vec<Cell>,
}

impl ComplexColumn {
    pub fn new(column: impl Into<ColumnName>) -> Self {
        Self {
            column: column.into(),
            deletion: DeletionTime::LIVE,
            cells: Vec::new(),
        }
    }
}

/// Data of one column within a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnData {
    Cell(Cell),
    Complex(ComplexColumn),
}

impl ColumnData {
    pub fn column(&self) -> &ColumnName {
        match self {
            ColumnData::Cell(c) => &c.column,
            ColumnData::Complex(c) => &c.column,
        }
    }

    /// Iterates over every cell of this column (one for simple columns).
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        let cells: &[Cell] = match self {
            ColumnData::Cell(c) => std::slice::from_ref(c),
            ColumnData::Complex(c) => &c.cells,
        };
        cells.iter()
    }
}
