//! Record codec of the legacy (`jb`, `ka`, `la`) generation.
//!
//! A legacy partition is a flat run of atoms. Each cell atom names its row by
//! clustering and its column by name; a row marker atom carries the row's
//! primary-key liveness and row deletion; a range tombstone atom holds both
//! bounds of the deleted interval.
//!
//! ```text
//! cell:            [clustering][column: u16 len + utf8][mask: u8][timestamp: i64]
//!                  [path]? [ttl: i32, local expiration: i32]? [local deletion: i32]? [value]?
//! row marker:      [clustering][liveness][row deletion]
//! range tombstone: [start bound][end bound][deletion]
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;
use std::path::Path;

use rows::{Cell, CellState, Clustering, DeletionTime, LivenessInfo, RangeTombstone};

use crate::encoding::{
    check_cell, check_prefix, expect_consumed, invalid, read_bound, read_bytes, read_clustering, read_deletion,
    read_expiration, read_liveness, read_str, write_bound, write_bytes, write_clustering, write_deletion,
    write_expiration, write_liveness, write_str,
};
use crate::error::{Result, SSTableError};
use crate::frame::{Frame, KIND_CELL_ATOM, KIND_RANGE_TOMBSTONE_ATOM, KIND_ROW_MARKER_ATOM};

pub const MASK_DELETION: u8 = 0x01;
pub const MASK_EXPIRATION: u8 = 0x02;
pub const MASK_PATH: u8 = 0x04;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    Cell {
        clustering: Clustering,
        cell: Cell,
    },
    RowMarker {
        clustering: Clustering,
        liveness: LivenessInfo,
        deletion: DeletionTime,
    },
    RangeTombstone(RangeTombstone),
}

impl Atom {
    /// Clustering of the row this atom belongs to; `None` for range tombstones.
    pub fn clustering(&self) -> Option<&Clustering> {
        match self {
            Atom::Cell { clustering, .. } | Atom::RowMarker { clustering, .. } => Some(clustering),
            Atom::RangeTombstone(_) => None,
        }
    }

    /// Frame kind and payload.
    pub fn encode(&self) -> Result<(u8, Vec<u8>)> {
        self.check_limits()?;
        let mut out = Vec::new();
        let encoded = match self {
            Atom::Cell { clustering, cell } => {
                write_clustering(&mut out, clustering);
                encode_cell(&mut out, cell);
                (KIND_CELL_ATOM, out)
            }
            Atom::RowMarker {
                clustering,
                liveness,
                deletion,
            } => {
                write_clustering(&mut out, clustering);
                write_liveness(&mut out, liveness);
                write_deletion(&mut out, deletion);
                (KIND_ROW_MARKER_ATOM, out)
            }
            Atom::RangeTombstone(rt) => {
                write_bound(&mut out, &rt.start);
                write_bound(&mut out, &rt.end);
                write_deletion(&mut out, &rt.deletion);
                (KIND_RANGE_TOMBSTONE_ATOM, out)
            }
        };
        Ok(encoded)
    }

    fn check_limits(&self) -> Result<()> {
        match self {
            Atom::Cell { clustering, cell } => {
                check_prefix(clustering.values())?;
                check_cell(cell)
            }
            Atom::RowMarker { clustering, .. } => check_prefix(clustering.values()),
            Atom::RangeTombstone(rt) => {
                check_prefix(&rt.start.values)?;
                check_prefix(&rt.end.values)
            }
        }
    }

    /// Decodes an atom frame of the data file at `path`.
    pub fn decode(frame: &Frame, path: &Path) -> Result<Atom> {
        decode_payload(frame.kind, &frame.payload).map_err(|e| {
            SSTableError::corrupt(path, frame.offset, format!("malformed atom: {}", e))
        })
    }
}

fn decode_payload(kind: u8, mut payload: &[u8]) -> io::Result<Atom> {
    let r = &mut payload;
    let atom = match kind {
        KIND_CELL_ATOM => {
            let clustering = read_clustering(r)?;
            let cell = decode_cell(r)?;
            Atom::Cell { clustering, cell }
        }
        KIND_ROW_MARKER_ATOM => Atom::RowMarker {
            clustering: read_clustering(r)?,
            liveness: read_liveness(r)?,
            deletion: read_deletion(r)?,
        },
        KIND_RANGE_TOMBSTONE_ATOM => {
            let start = read_bound(r)?;
            let end = read_bound(r)?;
            if !start.is_start() || end.is_start() {
                return Err(invalid("range tombstone bounds are reversed"));
            }
            Atom::RangeTombstone(RangeTombstone::new(start, end, read_deletion(r)?))
        }
        other => return Err(invalid(format!("unexpected record kind {:#04x}", other))),
    };
    expect_consumed(r)?;
    Ok(atom)
}

fn encode_cell(out: &mut Vec<u8>, cell: &Cell) {
    write_str(out, &cell.column);
    let mut mask = 0u8;
    match cell.state {
        CellState::Live => {}
        CellState::Expiring(_) => mask |= MASK_EXPIRATION,
        CellState::Tombstone { .. } => mask |= MASK_DELETION,
    }
    if cell.path.is_some() {
        mask |= MASK_PATH;
    }
    out.push(mask);
    let _ = out.write_i64::<LittleEndian>(cell.timestamp);
    if let Some(path) = &cell.path {
        write_bytes(out, path);
    }
    match cell.state {
        CellState::Live => write_bytes(out, &cell.value),
        CellState::Expiring(e) => {
            write_expiration(out, &e);
            write_bytes(out, &cell.value);
        }
        CellState::Tombstone { local_deletion_time } => {
            let _ = out.write_i32::<LittleEndian>(local_deletion_time);
        }
    }
}

fn decode_cell(r: &mut &[u8]) -> io::Result<Cell> {
    let column = read_str(r)?;
    let mask = r.read_u8()?;
    if mask & !(MASK_DELETION | MASK_EXPIRATION | MASK_PATH) != 0 {
        return Err(invalid(format!("unknown cell mask {:#04x}", mask)));
    }
    if mask & MASK_DELETION != 0 && mask & MASK_EXPIRATION != 0 {
        return Err(invalid("cell is both deleted and expiring"));
    }
    let timestamp = r.read_i64::<LittleEndian>()?;
    let path = if mask & MASK_PATH != 0 {
        Some(read_bytes(r)?)
    } else {
        None
    };
    let (state, value) = if mask & MASK_DELETION != 0 {
        let local_deletion_time = r.read_i32::<LittleEndian>()?;
        (CellState::Tombstone { local_deletion_time }, Vec::new())
    } else if mask & MASK_EXPIRATION != 0 {
        let e = read_expiration(r)?;
        (CellState::Expiring(e), read_bytes(r)?)
    } else {
        (CellState::Live, read_bytes(r)?)
    };
    Ok(Cell {
        column: column.into(),
        path,
        timestamp,
        value,
        state,
    })
}
