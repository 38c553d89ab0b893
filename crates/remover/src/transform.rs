use rows::{Cell, CellState, ColumnData, Row};

/// Returns `row` with every expiration removed.
///
/// Live and tombstone cells pass through untouched; an expiring cell becomes a
/// live cell with the same column, path, value and timestamp. Complex columns
/// keep their deletion and the order of their cells. The row deletion is kept
/// and the primary key liveness keeps its timestamp.
pub fn transform_row(row: Row) -> Row {
    RowTransform::default().apply(row)
}

/// [`transform_row`] plus counters for the rewrite summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowTransform {
    pub rows: u64,
    /// Cells that lost their expiration.
    pub stripped_cells: u64,
    /// Rows whose primary key liveness lost its expiration.
    pub stripped_row_markers: u64,
}

impl RowTransform {
    pub fn apply(&mut self, mut row: Row) -> Row {
        self.rows += 1;
        if row.liveness.is_expiring() {
            self.stripped_row_markers += 1;
            row.liveness = row.liveness.without_expiration();
        }
        row.columns = row
            .columns
            .into_iter()
            .map(|data| match data {
                ColumnData::Cell(cell) => ColumnData::Cell(self.cell(cell)),
                ColumnData::Complex(mut complex) => {
                    complex.cells = complex.cells.into_iter().map(|c| self.cell(c)).collect();
                    ColumnData::Complex(complex)
                }
            })
            .collect();
        row
    }

    fn cell(&mut self, cell: Cell) -> Cell {
        match cell.state {
            CellState::Expiring(_) => {
                self.stripped_cells += 1;
                cell.without_expiration()
            }
            CellState::Live | CellState::Tombstone { .. } => cell,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rows::{Clustering, ComplexColumn, DeletionTime, Expiration, LivenessInfo};

    fn expiring(column: &str, ts: i64, value: &[u8]) -> Cell {
        Cell::expiring(column, ts, value.to_vec(), Expiration::new(10, 1_533_270_615))
    }

    #[test]
    fn expiring_cells_become_live() {
        let mut row = Row::new(Clustering::regular(vec![b"c".to_vec()]));
        row.push_cell(expiring("v", 10, b"\x00\x00\x00\x07"));
        row.push_cell(Cell::tombstone("d", 11, 1533270605));
        row.push_cell(Cell::live("w", 12, b"w".to_vec()));

        let mut t = RowTransform::default();
        let out = t.apply(row);

        let v = out.cell("v").expect("v");
        assert_eq!(v.state, CellState::Live);
        assert_eq!((v.timestamp, v.value.as_slice()), (10, &b"\x00\x00\x00\x07"[..]));
        assert_eq!(
            out.cell("d").map(|c| c.state),
            Some(CellState::Tombstone {
                local_deletion_time: 1533270605
            })
        );
        assert_eq!(out.cell("w").map(|c| c.state), Some(CellState::Live));
        assert_eq!(t.stripped_cells, 1);
        assert_eq!(t.rows, 1);
    }

    #[test]
    fn complex_cells_are_handled_one_by_one() {
        let mut complex = ComplexColumn::new("tags");
        complex.deletion = DeletionTime::new(99, 9);
        complex.cells = vec![
            expiring("tags", 1, b"").with_path(b"a".to_vec()),
            Cell::tombstone("tags", 2, 5).with_path(b"b".to_vec()),
            expiring("tags", 3, b"").with_path(b"c".to_vec()),
        ];
        let mut row = Row::new(Clustering::regular(vec![b"c".to_vec()]));
        row.push_complex(complex);

        let out = transform_row(row);
        let Some(ColumnData::Complex(c)) = out.column("tags") else {
            panic!("complex column lost");
        };
        assert_eq!(c.deletion, DeletionTime::new(99, 9));
        let paths: Vec<_> = c.cells.iter().map(|c| c.path.clone()).collect();
        assert_eq!(paths, vec![Some(b"a".to_vec()), Some(b"b".to_vec()), Some(b"c".to_vec())]);
        assert!(c.cells.iter().all(|c| !c.is_expiring()));
        assert!(c.cells[1].is_tombstone());
    }

    #[test]
    fn row_liveness_and_deletion() {
        let mut row = Row::new(Clustering::regular(vec![b"c".to_vec()]));
        row.liveness = LivenessInfo::expiring(42, Expiration::new(10, 100));
        row.deletion = DeletionTime::new(7, 8);

        let mut t = RowTransform::default();
        let out = t.apply(row);
        assert_eq!(out.liveness, LivenessInfo::live(42));
        assert_eq!(out.deletion, DeletionTime::new(7, 8));
        assert_eq!(t.stripped_row_markers, 1);
    }

    #[test]
    fn rows_without_expiration_are_unchanged() {
        let mut row = Row::new(Clustering::Static);
        row.liveness = LivenessInfo::live(1);
        row.push_cell(Cell::live("s", 1, b"x".to_vec()));
        row.push_cell(Cell::tombstone("t", 2, 3));
        assert_eq!(transform_row(row.clone()), row);
    }
}
