//! Record codec of the modern (`ma`..`nb`) generation.
//!
//! Rows reference their columns by position in the file's
//! [`SerializationHeader`]; complex columns carry their own deletion and one
//! cell per element.
//!
//! ```text
//! row:    [flags: u8][clustering]? [liveness]? [row deletion]?
//!         [column count: u16] ([column index: u16] (cell | complex))*
//! cell:   [flags: u8][timestamp: i64][ttl, local expiration]? [local deletion]? [path]? [value]?
//! complex:[deletion][cell count: u32] cell*
//! marker: [kind: u8][prefix][deletion] | [kind: u8][prefix][close deletion][open deletion]
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io;
use std::path::Path;

use rows::{
    BoundKind, Cell, CellState, Clustering, ClusteringBound, ColumnData, ColumnName, ComplexColumn,
    LivenessInfo, RangeTombstoneMarker, Row, Unfiltered,
};
use schema::CqlType;

use crate::encoding::{
    bound_kind_byte, bound_kind_from_byte, check_len, check_marker, check_row, expect_consumed, invalid, read_bytes, read_clustering,
    read_deletion, read_expiration, read_prefix, write_bytes, write_clustering, write_deletion,
    write_expiration, write_prefix,
};
use crate::error::{Result, SSTableError};
use crate::frame::{Frame, KIND_MARKER, KIND_ROW};
use crate::stats::{HeaderColumn, SerializationHeader};

pub const ROW_IS_STATIC: u8 = 0x01;
pub const ROW_HAS_LIVENESS: u8 = 0x02;
pub const ROW_HAS_TTL: u8 = 0x04;
pub const ROW_HAS_DELETION: u8 = 0x08;

pub const CELL_DELETED: u8 = 0x01;
pub const CELL_EXPIRING: u8 = 0x02;
pub const CELL_HAS_PATH: u8 = 0x04;

/// Marker kind for a boundary closing inclusively and reopening exclusively.
const BOUNDARY_INCL_END_EXCL_START: u8 = 4;
/// Marker kind for a boundary closing exclusively and reopening inclusively.
const BOUNDARY_EXCL_END_INCL_START: u8 = 5;

#[derive(Debug, Clone)]
struct ColumnSlot {
    name: ColumnName,
    complex: bool,
}

#[derive(Debug, Clone, Default)]
struct ColumnTable {
    slots: Vec<ColumnSlot>,
    by_name: HashMap<String, u16>,
}

impl ColumnTable {
    fn new(columns: &[HeaderColumn]) -> Result<Self> {
        let mut table = ColumnTable::default();
        check_len("header columns", columns.len(), u16::MAX as usize)?;
        for (i, c) in columns.iter().enumerate() {
            let ty: CqlType = c.cql_type.parse()?;
            table.by_name.insert(c.name.clone(), i as u16);
            table.slots.push(ColumnSlot {
                name: ColumnName::from(c.name.as_str()),
                complex: ty.is_multi_cell(),
            });
        }
        Ok(table)
    }
}

/// Encodes and decodes rows and markers against one serialization header.
#[derive(Debug, Clone)]
pub struct ModernCodec {
    header: SerializationHeader,
    statics: ColumnTable,
    regulars: ColumnTable,
}

impl ModernCodec {
    pub fn new(header: SerializationHeader) -> Result<Self> {
        let statics = ColumnTable::new(&header.static_columns)?;
        let regulars = ColumnTable::new(&header.regular_columns)?;
        Ok(Self {
            header,
            statics,
            regulars,
        })
    }

    pub fn header(&self) -> &SerializationHeader {
        &self.header
    }

    /// Frame kind and payload.
    pub fn encode(&self, unfiltered: &Unfiltered) -> Result<(u8, Vec<u8>)> {
        match unfiltered {
            Unfiltered::Row(row) => {
                check_row(row)?;
                Ok((KIND_ROW, self.encode_row(row)?))
            }
            Unfiltered::Marker(marker) => {
                check_marker(marker)?;
                Ok((KIND_MARKER, encode_marker(marker)))
            }
        }
    }

    /// Decodes a row or marker frame of the data file at `path`.
    pub fn decode(&self, frame: &Frame, path: &Path) -> Result<Unfiltered> {
        let mut payload = frame.payload.as_slice();
        let r = &mut payload;
        let decoded = match frame.kind {
            KIND_ROW => self.decode_row(r).map(Unfiltered::Row),
            KIND_MARKER => decode_marker(r).map(Unfiltered::Marker),
            other => Err(invalid(format!("unexpected record kind {:#04x}", other))),
        };
        decoded
            .and_then(|u| expect_consumed(r).map(|_| u))
            .map_err(|e| SSTableError::corrupt(path, frame.offset, format!("malformed record: {}", e)))
    }

    fn encode_row(&self, row: &Row) -> Result<Vec<u8>> {
        let columns = if row.is_static() { &self.statics } else { &self.regulars };
        let mut flags = 0u8;
        if row.is_static() {
            flags |= ROW_IS_STATIC;
        }
        if !row.liveness.is_empty() {
            flags |= ROW_HAS_LIVENESS;
            if row.liveness.is_expiring() {
                flags |= ROW_HAS_TTL;
            }
        }
        if !row.deletion.is_live() {
            flags |= ROW_HAS_DELETION;
        }

        let mut out = Vec::new();
        out.push(flags);
        if !row.is_static() {
            write_clustering(&mut out, &row.clustering);
        }
        if flags & ROW_HAS_LIVENESS != 0 {
            let _ = out.write_i64::<LittleEndian>(row.liveness.timestamp);
            if let Some(e) = &row.liveness.expiration {
                write_expiration(&mut out, e);
            }
        }
        if flags & ROW_HAS_DELETION != 0 {
            write_deletion(&mut out, &row.deletion);
        }

        let _ = out.write_u16::<LittleEndian>(row.columns.len() as u16);
        for data in &row.columns {
            let name = data.column();
            let index = *columns
                .by_name
                .get(name.as_ref())
                .ok_or_else(|| SSTableError::UnknownColumn(name.to_string()))?;
            let _ = out.write_u16::<LittleEndian>(index);
            let complex = columns.slots[index as usize].complex;
            match (data, complex) {
                (ColumnData::Cell(cell), false) => encode_cell(&mut out, cell),
                (ColumnData::Complex(c), true) => {
                    write_deletion(&mut out, &c.deletion);
                    let _ = out.write_u32::<LittleEndian>(c.cells.len() as u32);
                    for cell in &c.cells {
                        encode_cell(&mut out, cell);
                    }
                }
                (ColumnData::Cell(cell), true) => {
                    write_deletion(&mut out, &rows::DeletionTime::LIVE);
                    let _ = out.write_u32::<LittleEndian>(1);
                    encode_cell(&mut out, cell);
                }
                (ColumnData::Complex(_), false) => {
                    return Err(SSTableError::HeaderMismatch(format!(
                        "column {} is simple but the row holds several cells for it",
                        name
                    )));
                }
            }
        }
        Ok(out)
    }

    fn decode_row(&self, r: &mut &[u8]) -> io::Result<Row> {
        let flags = r.read_u8()?;
        if flags & !(ROW_IS_STATIC | ROW_HAS_LIVENESS | ROW_HAS_TTL | ROW_HAS_DELETION) != 0 {
            return Err(invalid(format!("unknown row flags {:#04x}", flags)));
        }
        let is_static = flags & ROW_IS_STATIC != 0;
        let clustering = if is_static {
            Clustering::Static
        } else {
            match read_clustering(r)? {
                Clustering::Static => return Err(invalid("static clustering on a regular row")),
                c => c,
            }
        };
        let mut row = Row::new(clustering);
        if flags & ROW_HAS_LIVENESS != 0 {
            let timestamp = r.read_i64::<LittleEndian>()?;
            row.liveness = if flags & ROW_HAS_TTL != 0 {
                LivenessInfo::expiring(timestamp, read_expiration(r)?)
            } else {
                LivenessInfo::live(timestamp)
            };
        } else if flags & ROW_HAS_TTL != 0 {
            return Err(invalid("row ttl without liveness"));
        }
        if flags & ROW_HAS_DELETION != 0 {
            row.deletion = read_deletion(r)?;
        }

        let columns = if is_static { &self.statics } else { &self.regulars };
        let count = r.read_u16::<LittleEndian>()?;
        for _ in 0..count {
            let index = r.read_u16::<LittleEndian>()? as usize;
            let slot = columns
                .slots
                .get(index)
                .ok_or_else(|| invalid(format!("column index {} outside the header", index)))?;
            if slot.complex {
                let mut complex = ComplexColumn::new(slot.name.clone());
                complex.deletion = read_deletion(r)?;
                let n = r.read_u32::<LittleEndian>()?;
                for _ in 0..n {
                    complex.cells.push(decode_cell(r, &slot.name)?);
                }
                row.push_complex(complex);
            } else {
                row.push_cell(decode_cell(r, &slot.name)?);
            }
        }
        Ok(row)
    }
}

fn encode_cell(out: &mut Vec<u8>, cell: &Cell) {
    let mut flags = 0u8;
    match cell.state {
        CellState::Live => {}
        CellState::Expiring(_) => flags |= CELL_EXPIRING,
        CellState::Tombstone { .. } => flags |= CELL_DELETED,
    }
    if cell.path.is_some() {
        flags |= CELL_HAS_PATH;
    }
    out.push(flags);
    let _ = out.write_i64::<LittleEndian>(cell.timestamp);
    match cell.state {
        CellState::Live => {}
        CellState::Expiring(e) => write_expiration(out, &e),
        CellState::Tombstone { local_deletion_time } => {
            let _ = out.write_i32::<LittleEndian>(local_deletion_time);
        }
    }
    if let Some(path) = &cell.path {
        write_bytes(out, path);
    }
    if !cell.is_tombstone() {
        write_bytes(out, &cell.value);
    }
}

fn decode_cell(r: &mut &[u8], column: &ColumnName) -> io::Result<Cell> {
    let flags = r.read_u8()?;
    if flags & !(CELL_DELETED | CELL_EXPIRING | CELL_HAS_PATH) != 0 {
        return Err(invalid(format!("unknown cell flags {:#04x}", flags)));
    }
    let timestamp = r.read_i64::<LittleEndian>()?;
    let state = match (flags & CELL_DELETED != 0, flags & CELL_EXPIRING != 0) {
        (true, true) => return Err(invalid("cell is both deleted and expiring")),
        (true, false) => CellState::Tombstone {
            local_deletion_time: r.read_i32::<LittleEndian>()?,
        },
        (false, true) => CellState::Expiring(read_expiration(r)?),
        (false, false) => CellState::Live,
    };
    let path = if flags & CELL_HAS_PATH != 0 {
        Some(read_bytes(r)?)
    } else {
        None
    };
    let value = if flags & CELL_DELETED != 0 {
        Vec::new()
    } else {
        read_bytes(r)?
    };
    Ok(Cell {
        column: column.clone(),
        path,
        timestamp,
        value,
        state,
    })
}

fn encode_marker(marker: &RangeTombstoneMarker) -> Vec<u8> {
    let mut out = Vec::new();
    match marker {
        RangeTombstoneMarker::Bound { bound, deletion } => {
            out.push(bound_kind_byte(bound.kind));
            write_prefix(&mut out, &bound.values);
            write_deletion(&mut out, deletion);
        }
        RangeTombstoneMarker::Boundary {
            values,
            close_inclusive,
            close_deletion,
            open_deletion,
        } => {
            out.push(if *close_inclusive {
                BOUNDARY_INCL_END_EXCL_START
            } else {
                BOUNDARY_EXCL_END_INCL_START
            });
            write_prefix(&mut out, values);
            write_deletion(&mut out, close_deletion);
            write_deletion(&mut out, open_deletion);
        }
    }
    out
}

fn decode_marker(r: &mut &[u8]) -> io::Result<RangeTombstoneMarker> {
    let kind = r.read_u8()?;
    match kind {
        BOUNDARY_INCL_END_EXCL_START | BOUNDARY_EXCL_END_INCL_START => {
            let values = read_prefix(r)?;
            let close_deletion = read_deletion(r)?;
            let open_deletion = read_deletion(r)?;
            Ok(RangeTombstoneMarker::boundary(
                values,
                kind == BOUNDARY_INCL_END_EXCL_START,
                close_deletion,
                open_deletion,
            ))
        }
        other => {
            let kind: BoundKind = bound_kind_from_byte(other)?;
            let values = read_prefix(r)?;
            let deletion = read_deletion(r)?;
            Ok(RangeTombstoneMarker::bound(ClusteringBound::new(kind, values), deletion))
        }
    }
}
