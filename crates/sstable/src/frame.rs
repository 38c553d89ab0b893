//! CRC-checked record framing used by `Data.db`.
//!
//! ```text
//! [record_len: u32 LE][crc: u32 LE][kind: u8][payload]
//! ```
//!
//! `record_len` counts everything after itself (crc, kind and payload); the
//! crc covers kind and payload.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::{Result, SSTableError};

/// `record_len` + `crc`.
pub const FRAME_HEADER_BYTES: u64 = 4 + 4;

/// Frames larger than this are treated as a corrupt length prefix.
pub const MAX_FRAME_BYTES: u32 = 1 << 30;

pub const KIND_PARTITION_END: u8 = 0x00;
pub const KIND_PARTITION_START: u8 = 0x01;
pub const KIND_ROW: u8 = 0x02;
pub const KIND_MARKER: u8 = 0x03;
pub const KIND_CELL_ATOM: u8 = 0x10;
pub const KIND_ROW_MARKER_ATOM: u8 = 0x11;
pub const KIND_RANGE_TOMBSTONE_ATOM: u8 = 0x12;

/// A decoded frame and the data file offset it started at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub payload: Vec<u8>,
    pub offset: u64,
}

/// Largest payload a frame can carry under [`MAX_FRAME_BYTES`].
pub const MAX_PAYLOAD_BYTES: usize = (MAX_FRAME_BYTES - 4 - 1) as usize;

/// Writes one frame, returning the number of bytes written. Payloads over
/// [`MAX_PAYLOAD_BYTES`] are refused with `InvalidInput` before anything is
/// written.
pub fn write_frame<W: Write>(w: &mut W, kind: u8, payload: &[u8]) -> io::Result<u64> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes does not fit a frame", payload.len()),
        ));
    }
    let mut hasher = Crc32::new();
    hasher.update(&[kind]);
    hasher.update(payload);
    let crc = hasher.finalize();

    let record_len = (4 + 1 + payload.len()) as u32;
    w.write_u32::<LittleEndian>(record_len)?;
    w.write_u32::<LittleEndian>(crc)?;
    w.write_u8(kind)?;
    w.write_all(payload)?;
    Ok(4 + record_len as u64)
}

/// Reads the frame starting at `offset`. A clean end of stream before the
/// first byte yields `None`; anything cut short after that is corruption.
pub fn read_frame<R: Read>(r: &mut R, path: &Path, offset: u64) -> Result<Option<Frame>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match r.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(SSTableError::corrupt(path, offset, "truncated frame header")),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SSTableError::io(path, e)),
        }
    }
    let record_len = u32::from_le_bytes(len_buf);
    if !(5..=MAX_FRAME_BYTES).contains(&record_len) {
        return Err(SSTableError::corrupt(
            path,
            offset,
            format!("bad length prefix {}", record_len),
        ));
    }

    let truncated = |e: io::Error| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SSTableError::corrupt(path, offset, "truncated frame")
        } else {
            SSTableError::io(path, e)
        }
    };
    let crc = r.read_u32::<LittleEndian>().map_err(truncated)?;
    let kind = r.read_u8().map_err(truncated)?;
    let mut payload = vec![0u8; (record_len - 5) as usize];
    r.read_exact(&mut payload).map_err(truncated)?;

    let mut hasher = Crc32::new();
    hasher.update(&[kind]);
    hasher.update(&payload);
    if hasher.finalize() != crc {
        return Err(SSTableError::corrupt(path, offset, "frame checksum mismatch"));
    }
    Ok(Some(Frame {
        kind,
        payload,
        offset,
    }))
}

/// Size of a frame on disk.
pub fn frame_len(frame: &Frame) -> u64 {
    FRAME_HEADER_BYTES + 1 + frame.payload.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn p() -> &'static Path {
        Path::new("test-Data.db")
    }

    #[test]
    fn write_then_read_frames() {
        let mut buf = Vec::new();
        let n1 = write_frame(&mut buf, KIND_ROW, b"payload").unwrap();
        let n2 = write_frame(&mut buf, KIND_PARTITION_END, b"").unwrap();
        assert_eq!(n1, 8 + 1 + 7);
        assert_eq!(buf.len() as u64, n1 + n2);

        let mut r = Cursor::new(buf);
        let f1 = read_frame(&mut r, p(), 0).unwrap().unwrap();
        assert_eq!(f1.kind, KIND_ROW);
        assert_eq!(f1.payload, b"payload");
        assert_eq!(frame_len(&f1), n1);
        let f2 = read_frame(&mut r, p(), n1).unwrap().unwrap();
        assert_eq!(f2.kind, KIND_PARTITION_END);
        assert_eq!(f2.offset, n1);
        assert!(read_frame(&mut r, p(), n1 + n2).unwrap().is_none());
    }

    #[test]
    fn oversize_payload_is_refused_before_writing() {
        // Zeroed allocations stay untouched, so this does not commit a gigabyte.
        let payload = vec![0u8; MAX_PAYLOAD_BYTES + 1];
        let mut buf = Vec::new();
        let err = write_frame(&mut buf, KIND_ROW, &payload).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(buf.is_empty());
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut buf = Vec::new();
        write_frame(&mut buf, KIND_ROW, b"payload").unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xff;
        let err = read_frame(&mut Cursor::new(buf), p(), 40).unwrap_err();
        match err {
            SSTableError::Corrupt { offset, reason, .. } => {
                assert_eq!(offset, 40);
                assert!(reason.contains("checksum"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truncation_is_corruption() {
        let mut buf = Vec::new();
        write_frame(&mut buf, KIND_ROW, b"payload").unwrap();
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            read_frame(&mut Cursor::new(buf), p(), 0),
            Err(SSTableError::Corrupt { .. })
        ));

        assert!(matches!(
            read_frame(&mut Cursor::new(vec![1u8, 0]), p(), 0),
            Err(SSTableError::Corrupt { .. })
        ));
    }

    #[test]
    fn bad_length_prefix() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        buf.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            read_frame(&mut Cursor::new(buf), p(), 0),
            Err(SSTableError::Corrupt { .. })
        ));
    }
}
