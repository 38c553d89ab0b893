//! `Summary.db`: a sample of the index, one entry every `index_interval`
//! partitions, plus the first and last partition keys.
//!
//! ```text
//! [interval: u32 LE][sample_count: u32 LE]
//! ([key_len: u32 LE][key][index_offset: u64 LE])*
//! [first_key_len: u32 LE][first_key][last_key_len: u32 LE][last_key]
//! [sample_count: u64 LE][crc: u32 LE][magic: u32 LE = "SSTS"]
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use crate::error::{Result, SSTableError};
use crate::format::{footer_pos, write_footer, FOOTER_BYTES, SUMMARY_MAGIC};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Summary {
    pub interval: u32,
    /// `(key, offset in Index.db)` for every sampled partition.
    pub samples: Vec<(Vec<u8>, u64)>,
    pub first_key: Vec<u8>,
    pub last_key: Vec<u8>,
}

impl Summary {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Vec writes are infallible.
        let _ = out.write_u32::<LittleEndian>(self.interval);
        let _ = out.write_u32::<LittleEndian>(self.samples.len() as u32);
        for (key, index_offset) in &self.samples {
            put_bytes(&mut out, key);
            let _ = out.write_u64::<LittleEndian>(*index_offset);
        }
        put_bytes(&mut out, &self.first_key);
        put_bytes(&mut out, &self.last_key);
        let crc = crc32fast::hash(&out);
        let _ = write_footer(&mut out, self.samples.len() as u64, crc, SUMMARY_MAGIC);
        out
    }

    pub fn load(path: &Path) -> Result<Summary> {
        let bytes = fs::read(path).map_err(|e| SSTableError::io(path, e))?;
        if (bytes.len() as u64) < FOOTER_BYTES {
            return Err(SSTableError::corrupt(path, 0, "summary file too small"));
        }
        let body_len = footer_pos(bytes.len() as u64) as usize;
        let (body, mut footer) = bytes.split_at(body_len);
        let count = footer.read_u64::<LittleEndian>().map_err(|e| SSTableError::io(path, e))?;
        let crc = footer.read_u32::<LittleEndian>().map_err(|e| SSTableError::io(path, e))?;
        let magic = footer.read_u32::<LittleEndian>().map_err(|e| SSTableError::io(path, e))?;
        if magic != SUMMARY_MAGIC {
            return Err(SSTableError::corrupt(path, body_len as u64, format!("invalid summary magic: {:x}", magic)));
        }
        if crc32fast::hash(body) != crc {
            return Err(SSTableError::corrupt(path, body_len as u64, "summary checksum mismatch"));
        }
        let summary = decode_body(body)
            .map_err(|e| SSTableError::corrupt(path, 0, format!("malformed summary: {}", e)))?;
        if summary.samples.len() as u64 != count {
            return Err(SSTableError::corrupt(path, body_len as u64, "summary sample count mismatch"));
        }
        Ok(summary)
    }
}

fn put_bytes(out: &mut Vec<u8>, b: &[u8]) {
    let _ = out.write_u32::<LittleEndian>(b.len() as u32);
    out.extend_from_slice(b);
}

fn get_bytes(r: &mut &[u8]) -> io::Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > r.len() {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "key runs past summary end"));
    }
    let mut v = vec![0u8; len];
    r.read_exact(&mut v)?;
    Ok(v)
}

fn decode_body(mut body: &[u8]) -> io::Result<Summary> {
    let r = &mut body;
    let interval = r.read_u32::<LittleEndian>()?;
    let n = r.read_u32::<LittleEndian>()?;
    let mut samples = Vec::new();
    for _ in 0..n {
        let key = get_bytes(r)?;
        samples.push((key, r.read_u64::<LittleEndian>()?));
    }
    let first_key = get_bytes(r)?;
    let last_key = get_bytes(r)?;
    Ok(Summary {
        interval,
        samples,
        first_key,
        last_key,
    })
}

/// Collects the summary while index entries are written.
#[derive(Debug)]
pub struct SummaryBuilder {
    summary: Summary,
    seen: u64,
}

impl SummaryBuilder {
    pub fn new(interval: usize) -> Self {
        Self {
            summary: Summary {
                interval: interval.clamp(1, u32::MAX as usize) as u32,
                ..Summary::default()
            },
            seen: 0,
        }
    }

    pub fn add(&mut self, key: &[u8], index_offset: u64) {
        if self.seen % self.summary.interval as u64 == 0 {
            self.summary.samples.push((key.to_vec(), index_offset));
        }
        if self.seen == 0 {
            self.summary.first_key = key.to_vec();
        }
        self.summary.last_key = key.to_vec();
        self.seen += 1;
    }

    pub fn build(&self) -> &Summary {
        &self.summary
    }
}
