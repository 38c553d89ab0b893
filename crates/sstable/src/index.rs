//! `Index.db`: one entry per partition, in data order.
//!
//! ```text
//! [key_len: u32 LE][key][data_offset: u64 LE]   repeated
//! [entry_count: u64 LE][crc: u32 LE][magic: u32 LE = "SSTI"]
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SSTableError};
use crate::format::{read_footer, write_footer, FOOTER_BYTES, INDEX_MAGIC};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    /// Offset of the partition start frame in `Data.db`.
    pub data_offset: u64,
    /// Offset of this entry in `Index.db`.
    pub index_offset: u64,
}

/// Streams index entries to disk, checksumming as it goes.
pub struct IndexWriter {
    path: PathBuf,
    out: BufWriter<File>,
    hasher: Crc32,
    offset: u64,
    count: u64,
}

impl IndexWriter {
    pub fn create(path: &Path, buffer_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| SSTableError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::with_capacity(buffer_size, file),
            hasher: Crc32::new(),
            offset: 0,
            count: 0,
        })
    }

    /// Appends an entry and returns its offset within the index.
    pub fn append(&mut self, key: &[u8], data_offset: u64) -> Result<u64> {
        let mut entry = Vec::with_capacity(key.len() + 12);
        entry.write_u32::<LittleEndian>(key.len() as u32).map_err(|e| self.err(e))?;
        entry.extend_from_slice(key);
        entry.write_u64::<LittleEndian>(data_offset).map_err(|e| self.err(e))?;

        self.out.write_all(&entry).map_err(|e| self.err(e))?;
        self.hasher.update(&entry);
        let at = self.offset;
        self.offset += entry.len() as u64;
        self.count += 1;
        Ok(at)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Writes the footer, flushes and optionally fsyncs.
    pub fn finish(&mut self, sync: bool) -> Result<u64> {
        let crc = self.hasher.clone().finalize();
        write_footer(&mut self.out, self.count, crc, INDEX_MAGIC).map_err(|e| self.err(e))?;
        self.out.flush().map_err(|e| self.err(e))?;
        if sync {
            self.out.get_ref().sync_all().map_err(|e| self.err(e))?;
        }
        Ok(self.count)
    }

    fn err(&self, e: io::Error) -> SSTableError {
        SSTableError::io(&self.path, e)
    }
}

/// Walks `Index.db` front to back.
///
/// The footer is read up front; the entry count and checksum are verified
/// once the last entry has been yielded, so a caller that consumes the whole
/// iterator has validated the file.
pub struct KeyIterator {
    path: PathBuf,
    reader: BufReader<File>,
    hasher: Crc32,
    pos: u64,
    entries_end: u64,
    expected_count: u64,
    expected_crc: u32,
    seen: u64,
    done: bool,
}

impl KeyIterator {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| SSTableError::io(path, e))?;
        let len = file.metadata().map_err(|e| SSTableError::io(path, e))?.len();
        if len < FOOTER_BYTES {
            return Err(SSTableError::corrupt(path, 0, "index file too small"));
        }
        let (expected_count, expected_crc, magic) =
            read_footer(&mut file).map_err(|e| SSTableError::io(path, e))?;
        if magic != INDEX_MAGIC {
            return Err(SSTableError::corrupt(
                path,
                len - 4,
                format!("invalid index magic: {:x}", magic),
            ));
        }
        file.seek(SeekFrom::Start(0)).map_err(|e| SSTableError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            hasher: Crc32::new(),
            pos: 0,
            entries_end: len - FOOTER_BYTES,
            expected_count,
            expected_crc,
            seen: 0,
            done: false,
        })
    }

    /// Entry count recorded in the footer.
    pub fn expected_count(&self) -> u64 {
        self.expected_count
    }

    fn read_entry(&mut self) -> Result<IndexEntry> {
        let start = self.pos;
        let corrupt = |reason: &str| SSTableError::corrupt(&self.path, start, reason.to_string());
        if self.entries_end - start < 12 {
            return Err(corrupt("index entry overruns footer"));
        }
        let mut len_buf = [0u8; 4];
        self.reader
            .read_exact(&mut len_buf)
            .map_err(|e| SSTableError::io(&self.path, e))?;
        let key_len = u32::from_le_bytes(len_buf) as u64;
        if key_len + 12 > self.entries_end - start {
            return Err(SSTableError::corrupt(&self.path, start, "bad key length in index entry"));
        }
        let mut key = vec![0u8; key_len as usize];
        self.reader
            .read_exact(&mut key)
            .map_err(|e| SSTableError::io(&self.path, e))?;
        let data_offset = self
            .reader
            .read_u64::<LittleEndian>()
            .map_err(|e| SSTableError::io(&self.path, e))?;

        self.hasher.update(&len_buf);
        self.hasher.update(&key);
        self.hasher.update(&data_offset.to_le_bytes());
        self.pos = start + 12 + key_len;
        self.seen += 1;
        Ok(IndexEntry {
            key,
            data_offset,
            index_offset: start,
        })
    }

    fn verify(&self) -> Result<()> {
        if self.seen != self.expected_count {
            return Err(SSTableError::corrupt(
                &self.path,
                self.entries_end,
                format!("index holds {} entries, footer says {}", self.seen, self.expected_count),
            ));
        }
        if self.hasher.clone().finalize() != self.expected_crc {
            return Err(SSTableError::corrupt(&self.path, self.entries_end, "index checksum mismatch"));
        }
        Ok(())
    }
}

impl Iterator for KeyIterator {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.pos == self.entries_end {
            self.done = true;
            return self.verify().err().map(Err);
        }
        let entry = self.read_entry();
        if entry.is_err() {
            self.done = true;
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    fn write_index(path: &Path, keys: &[&[u8]]) -> Result<()> {
        let mut w = IndexWriter::create(path, 4096)?;
        for (i, k) in keys.iter().enumerate() {
            w.append(k, i as u64 * 100)?;
        }
        w.finish(true)?;
        Ok(())
    }

    #[test]
    fn entries_come_back_in_order() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mc-1-big-Index.db");
        write_index(&path, &[b"a", b"bb", b""])?;

        let it = KeyIterator::open(&path)?;
        assert_eq!(it.expected_count(), 3);
        let entries: Vec<IndexEntry> = it.collect::<std::result::Result<_, _>>()?;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].key, b"bb");
        assert_eq!(entries[1].data_offset, 100);
        assert_eq!(entries[1].index_offset, 4 + 1 + 8);
        assert!(entries[2].key.is_empty());
        Ok(())
    }

    #[test]
    fn empty_index_is_valid() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mc-1-big-Index.db");
        write_index(&path, &[])?;
        assert_eq!(KeyIterator::open(&path)?.count(), 0);
        Ok(())
    }

    #[test]
    fn flipped_key_byte_fails_checksum() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mc-1-big-Index.db");
        write_index(&path, &[b"key1", b"key2"])?;
        let mut bytes = std::fs::read(&path)?;
        bytes[5] ^= 0x01;
        std::fs::write(&path, bytes)?;

        let results: Vec<_> = KeyIterator::open(&path)?.collect();
        assert!(matches!(results.last(), Some(Err(SSTableError::Corrupt { .. }))));
        Ok(())
    }

    #[test]
    fn bad_magic_and_short_files() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mc-1-big-Index.db");
        std::fs::write(&path, b"short")?;
        assert!(matches!(KeyIterator::open(&path), Err(SSTableError::Corrupt { .. })));

        std::fs::write(&path, [0u8; 16])?;
        assert!(matches!(KeyIterator::open(&path), Err(SSTableError::Corrupt { .. })));
        Ok(())
    }

    #[test]
    fn count_mismatch_is_detected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mc-1-big-Index.db");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(b'k');
        bytes.extend_from_slice(&0u64.to_le_bytes());
        let crc = crc32fast::hash(&bytes);
        write_footer(&mut bytes, 2, crc, INDEX_MAGIC)?;
        std::fs::write(&path, bytes)?;

        let results: Vec<_> = KeyIterator::open(&path)?.collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        Ok(())
    }
}
