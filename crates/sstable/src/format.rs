//! Magic numbers, the `Data.db` header and the footer shared by `Index.db`
//! and `Summary.db`.
//!
//! ```text
//! Data.db header:  [magic: u32 LE = "SST1"][version tag: 2 bytes]
//! index footer:    [entry_count: u64 LE][crc: u32 LE][magic: u32 LE]
//! ```
//!
//! The footer crc covers every byte before the footer.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Result as IoResult, Seek, SeekFrom, Write};

use crate::version::Version;

/// Magic number opening every `Data.db` (ASCII "SST1").
pub const DATA_MAGIC: u32 = 0x5353_5431;

/// Magic closing `Index.db` (ASCII "SSTI").
pub const INDEX_MAGIC: u32 = 0x5353_5449;

/// Magic closing `Summary.db` (ASCII "SSTS").
pub const SUMMARY_MAGIC: u32 = 0x5353_5453;

/// 4 (magic) + 2 (version tag).
pub const DATA_HEADER_BYTES: u64 = 4 + 2;

/// 8 (`entry_count`) + 4 (`crc`) + 4 (`magic`).
pub const FOOTER_BYTES: u64 = 8 + 4 + 4;

pub fn write_data_header<W: Write>(w: &mut W, version: Version) -> IoResult<()> {
    w.write_u32::<LittleEndian>(DATA_MAGIC)?;
    w.write_all(version.tag().as_bytes())
}

/// Reads `(magic, version tag)`; validation is left to the caller.
pub fn read_data_header<R: Read>(r: &mut R) -> IoResult<(u32, [u8; 2])> {
    let magic = r.read_u32::<LittleEndian>()?;
    let mut tag = [0u8; 2];
    r.read_exact(&mut tag)?;
    Ok((magic, tag))
}

/// Byte offset where the footer starts: `filesize - 16`, or 0 for files
/// smaller than a footer.
pub fn footer_pos(filesize: u64) -> u64 {
    filesize.saturating_sub(FOOTER_BYTES)
}

pub fn write_footer<W: Write>(w: &mut W, entry_count: u64, crc: u32, magic: u32) -> IoResult<()> {
    w.write_u64::<LittleEndian>(entry_count)?;
    w.write_u32::<LittleEndian>(crc)?;
    w.write_u32::<LittleEndian>(magic)?;
    Ok(())
}

/// Reads `(entry_count, crc, magic)` from the end of `r`. Leaves the cursor
/// at the end of the file.
pub fn read_footer<R: Read + Seek>(r: &mut R) -> IoResult<(u64, u32, u32)> {
    let filesize = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(footer_pos(filesize)))?;
    let entry_count = r.read_u64::<LittleEndian>()?;
    let crc = r.read_u32::<LittleEndian>()?;
    let magic = r.read_u32::<LittleEndian>()?;
    Ok((entry_count, crc, magic))
}
