//! Payload primitives shared by the legacy and modern record codecs.
//!
//! Encoders append to a `Vec<u8>`; decoders consume a `&[u8]` cursor the way
//! `byteorder` reads from slices, so a short payload surfaces as
//! `UnexpectedEof` and the caller turns it into a corruption error at the
//! frame's offset.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};

use rows::{
    BoundKind, Cell, Clustering, ClusteringBound, ColumnData, DeletionTime, Expiration, LivenessInfo,
    RangeTombstoneMarker, Row,
};

use crate::error::{Result, SSTableError};

/// Clustering value count reserved for the static clustering.
pub const STATIC_CLUSTERING: u16 = 0xFFFF;

/// Longest partition key a table accepts.
pub const MAX_KEY_BYTES: usize = u16::MAX as usize;
/// Longest column name a record can carry.
pub const MAX_NAME_BYTES: usize = u16::MAX as usize;
/// Most values in a clustering or bound prefix; the next count is
/// [`STATIC_CLUSTERING`].
pub const MAX_PREFIX_VALUES: usize = STATIC_CLUSTERING as usize - 1;
/// Longest value, path or cell list behind a `u32` length.
pub const MAX_VALUE_BYTES: usize = u32::MAX as usize;

/// Length prefixes are narrower than `usize`; everything written goes
/// through these checks first so a prefix is never truncated.
pub(crate) fn check_len(what: &'static str, len: usize, limit: usize) -> Result<()> {
    if len > limit {
        return Err(SSTableError::TooLarge { what, len, limit });
    }
    Ok(())
}

pub(crate) fn check_prefix(values: &[Vec<u8>]) -> Result<()> {
    check_len("clustering prefix values", values.len(), MAX_PREFIX_VALUES)?;
    values
        .iter()
        .try_for_each(|v| check_len("clustering value", v.len(), MAX_VALUE_BYTES))
}

pub(crate) fn check_cell(cell: &Cell) -> Result<()> {
    check_len("column name", cell.column.len(), MAX_NAME_BYTES)?;
    check_len("cell value", cell.value.len(), MAX_VALUE_BYTES)?;
    if let Some(path) = &cell.path {
        check_len("cell path", path.len(), MAX_VALUE_BYTES)?;
    }
    Ok(())
}

pub(crate) fn check_row(row: &Row) -> Result<()> {
    check_prefix(row.clustering.values())?;
    check_len("row columns", row.columns.len(), u16::MAX as usize)?;
    for data in &row.columns {
        if let ColumnData::Complex(c) = data {
            check_len("complex column cells", c.cells.len(), MAX_VALUE_BYTES)?;
        }
        data.cells().try_for_each(check_cell)?;
    }
    Ok(())
}

pub(crate) fn check_marker(marker: &RangeTombstoneMarker) -> Result<()> {
    check_prefix(marker.values())
}

pub fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    // Writes into a Vec cannot fail.
    let _ = out.write_u32::<LittleEndian>(bytes.len() as u32);
    out.extend_from_slice(bytes);
}

pub fn read_bytes(r: &mut &[u8]) -> io::Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > r.len() {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "value runs past record end"));
    }
    let mut v = vec![0u8; len];
    r.read_exact(&mut v)?;
    Ok(v)
}

pub fn write_str(out: &mut Vec<u8>, s: &str) {
    let _ = out.write_u16::<LittleEndian>(s.len() as u16);
    out.extend_from_slice(s.as_bytes());
}

pub fn read_str(r: &mut &[u8]) -> io::Result<String> {
    let len = r.read_u16::<LittleEndian>()? as usize;
    let mut v = vec![0u8; len];
    r.read_exact(&mut v)?;
    String::from_utf8(v).map_err(|_| invalid("column name is not utf-8"))
}

fn write_values(out: &mut Vec<u8>, values: &[Vec<u8>]) {
    let _ = out.write_u16::<LittleEndian>(values.len() as u16);
    for v in values {
        write_bytes(out, v);
    }
}

fn read_values(r: &mut &[u8], count: u16) -> io::Result<Vec<Vec<u8>>> {
    (0..count).map(|_| read_bytes(r)).collect()
}

pub fn write_clustering(out: &mut Vec<u8>, clustering: &Clustering) {
    match clustering {
        Clustering::Static => {
            let _ = out.write_u16::<LittleEndian>(STATIC_CLUSTERING);
        }
        Clustering::Regular(values) => write_values(out, values),
    }
}

pub fn read_clustering(r: &mut &[u8]) -> io::Result<Clustering> {
    match r.read_u16::<LittleEndian>()? {
        STATIC_CLUSTERING => Ok(Clustering::Static),
        n => Ok(Clustering::Regular(read_values(r, n)?)),
    }
}

pub fn bound_kind_byte(kind: BoundKind) -> u8 {
    match kind {
        BoundKind::InclStart => 0,
        BoundKind::ExclStart => 1,
        BoundKind::InclEnd => 2,
        BoundKind::ExclEnd => 3,
    }
}

pub fn bound_kind_from_byte(b: u8) -> io::Result<BoundKind> {
    match b {
        0 => Ok(BoundKind::InclStart),
        1 => Ok(BoundKind::ExclStart),
        2 => Ok(BoundKind::InclEnd),
        3 => Ok(BoundKind::ExclEnd),
        other => Err(invalid(format!("unknown bound kind {}", other))),
    }
}

pub fn write_bound(out: &mut Vec<u8>, bound: &ClusteringBound) {
    out.push(bound_kind_byte(bound.kind));
    write_values(out, &bound.values);
}

pub fn read_bound(r: &mut &[u8]) -> io::Result<ClusteringBound> {
    let kind = bound_kind_from_byte(r.read_u8()?)?;
    let n = r.read_u16::<LittleEndian>()?;
    Ok(ClusteringBound::new(kind, read_values(r, n)?))
}

/// Values of a bound or boundary without the kind byte.
pub fn write_prefix(out: &mut Vec<u8>, values: &[Vec<u8>]) {
    write_values(out, values);
}

pub fn read_prefix(r: &mut &[u8]) -> io::Result<Vec<Vec<u8>>> {
    let n = r.read_u16::<LittleEndian>()?;
    read_values(r, n)
}

pub fn write_deletion(out: &mut Vec<u8>, d: &DeletionTime) {
    let _ = out.write_i64::<LittleEndian>(d.marked_for_delete_at);
    let _ = out.write_i32::<LittleEndian>(d.local_deletion_time);
}

pub fn read_deletion(r: &mut &[u8]) -> io::Result<DeletionTime> {
    let marked_for_delete_at = r.read_i64::<LittleEndian>()?;
    let local_deletion_time = r.read_i32::<LittleEndian>()?;
    Ok(DeletionTime::new(marked_for_delete_at, local_deletion_time))
}

pub fn write_expiration(out: &mut Vec<u8>, e: &Expiration) {
    let _ = out.write_i32::<LittleEndian>(e.ttl);
    let _ = out.write_i32::<LittleEndian>(e.local_expiration_time);
}

pub fn read_expiration(r: &mut &[u8]) -> io::Result<Expiration> {
    let ttl = r.read_i32::<LittleEndian>()?;
    let local_expiration_time = r.read_i32::<LittleEndian>()?;
    Ok(Expiration::new(ttl, local_expiration_time))
}

/// Liveness as `[timestamp i64][has_ttl u8][ttl, local expiration time]`.
pub fn write_liveness(out: &mut Vec<u8>, l: &LivenessInfo) {
    let _ = out.write_i64::<LittleEndian>(l.timestamp);
    match &l.expiration {
        Some(e) => {
            out.push(1);
            write_expiration(out, e);
        }
        None => out.push(0),
    }
}

pub fn read_liveness(r: &mut &[u8]) -> io::Result<LivenessInfo> {
    let timestamp = r.read_i64::<LittleEndian>()?;
    let expiration = match r.read_u8()? {
        0 => None,
        1 => Some(read_expiration(r)?),
        other => return Err(invalid(format!("bad liveness flag {}", other))),
    };
    Ok(LivenessInfo {
        timestamp,
        expiration,
    })
}

/// Partition start payload: `[key bytes][partition deletion]`.
pub fn encode_partition_start(key: &[u8], deletion: &DeletionTime) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 16);
    write_bytes(&mut out, key);
    write_deletion(&mut out, deletion);
    out
}

pub fn decode_partition_start(mut payload: &[u8]) -> io::Result<(Vec<u8>, DeletionTime)> {
    let r = &mut payload;
    let key = read_bytes(r)?;
    let deletion = read_deletion(r)?;
    expect_consumed(r)?;
    Ok((key, deletion))
}

pub fn expect_consumed(r: &[u8]) -> io::Result<()> {
    if r.is_empty() {
        Ok(())
    } else {
        Err(invalid(format!("{} trailing bytes in record", r.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_clustering_uses_reserved_count() {
        let mut out = Vec::new();
        write_clustering(&mut out, &Clustering::Static);
        assert_eq!(out, vec![0xFF, 0xFF]);
        assert_eq!(read_clustering(&mut out.as_slice()).unwrap(), Clustering::Static);
    }

    #[test]
    fn bound_keeps_inclusivity() {
        let b = ClusteringBound::exclusive_start(vec![b"a".to_vec(), Vec::new()]);
        let mut out = Vec::new();
        write_bound(&mut out, &b);
        let mut r = out.as_slice();
        assert_eq!(read_bound(&mut r).unwrap(), b);
        assert!(r.is_empty());
    }

    #[test]
    fn partition_start_carries_deletion() {
        let dt = DeletionTime::new(1533270606330537, 1533270606);
        let payload = encode_partition_start(b"pk", &dt);
        let (key, decoded) = decode_partition_start(&payload).unwrap();
        assert_eq!(key, b"pk");
        assert_eq!(decoded, dt);
    }

    #[test]
    fn short_payload_is_eof() {
        let mut out = Vec::new();
        write_bytes(&mut out, b"value");
        out.truncate(6);
        let err = read_bytes(&mut out.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut payload = encode_partition_start(b"pk", &DeletionTime::LIVE);
        payload.push(0);
        assert!(decode_partition_start(&payload).is_err());
    }
}
