use crc32fast::Hasher as Crc32;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use rows::DeletionTime;

use crate::descriptor::{Component, Descriptor};
use crate::encoding::decode_partition_start;
use crate::error::{Result, SSTableError};
use crate::filter::PartitionFilter;
use crate::format::{read_data_header, DATA_HEADER_BYTES, DATA_MAGIC};
use crate::frame::{frame_len, read_frame, Frame, KIND_PARTITION_END, KIND_PARTITION_START};
use crate::index::KeyIterator;
use crate::stats::StatsMetadata;
use crate::summary::Summary;
use crate::version::Version;

/// How `Data.db` is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskAccessMode {
    /// Buffered reads through a `BufReader`.
    #[default]
    Standard,
    /// The whole data file memory-mapped.
    Mmap,
}

/// An opened, complete SSTable.
///
/// Opening checks that the table of contents exists (a table without one was
/// never finished) and loads the statistics. Components are opened lazily by
/// the accessors.
#[derive(Debug, Clone)]
pub struct SSTableReader {
    descriptor: Descriptor,
    stats: StatsMetadata,
}

impl SSTableReader {
    pub fn open(descriptor: &Descriptor) -> Result<Self> {
        let toc = descriptor.path_for(Component::Toc);
        if !toc.exists() {
            return Err(SSTableError::Incomplete(descriptor.path_for(Component::Data)));
        }
        let listed = fs::read_to_string(&toc).map_err(|e| SSTableError::io(&toc, e))?;
        if !listed.lines().any(|l| l.trim() == Component::Data.file_suffix()) {
            return Err(SSTableError::corrupt(&toc, 0, "table of contents does not list Data.db"));
        }
        let stats = StatsMetadata::load(&descriptor.path_for(Component::Statistics))?;
        if stats.version != descriptor.version.tag() {
            return Err(SSTableError::corrupt(
                descriptor.path_for(Component::Statistics),
                0,
                format!("statistics written for version {}, file is {}", stats.version, descriptor.version),
            ));
        }
        Ok(Self {
            descriptor: descriptor.clone(),
            stats,
        })
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn stats(&self) -> &StatsMetadata {
        &self.stats
    }

    /// Opens a forward-only cursor over `Data.db`. When `Digest.crc32` is
    /// present the cursor checks it once the data is exhausted.
    pub fn data_cursor(&self, mode: DiskAccessMode, buffer_size: usize) -> Result<DataCursor> {
        let digest_path = self.descriptor.path_for(Component::Digest);
        let expected_digest = if digest_path.exists() {
            let text = fs::read_to_string(&digest_path).map_err(|e| SSTableError::io(&digest_path, e))?;
            let digest = text
                .trim()
                .parse::<u32>()
                .map_err(|_| SSTableError::corrupt(&digest_path, 0, "digest is not a decimal crc32"))?;
            Some(digest)
        } else {
            None
        };
        DataCursor::open(
            &self.descriptor.path_for(Component::Data),
            self.descriptor.version,
            mode,
            buffer_size,
            expected_digest,
        )
    }

    pub fn keys(&self) -> Result<KeyIterator> {
        KeyIterator::open(&self.descriptor.path_for(Component::Index))
    }

    pub fn summary(&self) -> Result<Summary> {
        Summary::load(&self.descriptor.path_for(Component::Summary))
    }

    pub fn filter(&self) -> Result<PartitionFilter> {
        PartitionFilter::load(&self.descriptor.path_for(Component::Filter))
    }
}

enum Source {
    Buffered(BufReader<File>),
    Mapped(Cursor<Mmap>),
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Buffered(r) => r.read(buf),
            Source::Mapped(r) => r.read(buf),
        }
    }
}

/// Counts and checksums every byte pulled from the source.
struct Tracked {
    source: Source,
    offset: u64,
    digest: Crc32,
}

impl Read for Tracked {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.source.read(buf)?;
        self.digest.update(&buf[..n]);
        self.offset += n as u64;
        Ok(n)
    }
}

/// Start of a partition: its key, its partition-level deletion and the data
/// offset of its start frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionHeader {
    pub key: Vec<u8>,
    pub deletion: DeletionTime,
    pub offset: u64,
}

/// Single-pass cursor over the frames of `Data.db`.
///
/// [`next_partition`](DataCursor::next_partition) moves to the next partition,
/// skipping whatever is left of the current one;
/// [`next_record`](DataCursor::next_record) yields the record frames of the
/// current partition until its end frame. The file handle is released once
/// the data is exhausted, on [`close`](DataCursor::close) or on drop.
pub struct DataCursor {
    path: PathBuf,
    input: Option<Tracked>,
    expected_digest: Option<u32>,
    in_partition: bool,
}

impl DataCursor {
    pub fn open(
        path: &Path,
        version: Version,
        mode: DiskAccessMode,
        buffer_size: usize,
        expected_digest: Option<u32>,
    ) -> Result<Self> {
        let file = File::open(path).map_err(|e| SSTableError::io(path, e))?;
        let len = file.metadata().map_err(|e| SSTableError::io(path, e))?.len();
        if len < DATA_HEADER_BYTES {
            return Err(SSTableError::corrupt(path, 0, "data file too small"));
        }
        let source = match mode {
            DiskAccessMode::Standard => Source::Buffered(BufReader::with_capacity(buffer_size.max(1), file)),
            DiskAccessMode::Mmap => {
                // SAFETY: sstables are immutable once written.
                let map = unsafe { Mmap::map(&file) }.map_err(|e| SSTableError::io(path, e))?;
                Source::Mapped(Cursor::new(map))
            }
        };
        let mut input = Tracked {
            source,
            offset: 0,
            digest: Crc32::new(),
        };

        let (magic, tag) = read_data_header(&mut input).map_err(|e| SSTableError::io(path, e))?;
        if magic != DATA_MAGIC {
            return Err(SSTableError::corrupt(path, 0, format!("invalid data magic: {:x}", magic)));
        }
        if tag != version.tag().as_bytes() {
            return Err(SSTableError::corrupt(
                path,
                4,
                format!(
                    "data written as version {:?}, expected {}",
                    String::from_utf8_lossy(&tag),
                    version
                ),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            input: Some(input),
            expected_digest,
            in_partition: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed so far; the total length once the data is exhausted.
    pub fn offset(&self) -> u64 {
        self.input.as_ref().map_or(0, |i| i.offset)
    }

    pub fn is_closed(&self) -> bool {
        self.input.is_none()
    }

    /// Moves to the next partition. Returns `None` at the end of the data,
    /// after verifying the digest.
    pub fn next_partition(&mut self) -> Result<Option<PartitionHeader>> {
        while self.in_partition {
            self.next_record()?;
        }
        let Some(frame) = self.read_frame()? else {
            self.verify_digest()?;
            self.close();
            return Ok(None);
        };
        if frame.kind != KIND_PARTITION_START {
            return Err(SSTableError::corrupt(
                &self.path,
                frame.offset,
                format!("expected partition start, found record kind {:#04x}", frame.kind),
            ));
        }
        let (key, deletion) = decode_partition_start(&frame.payload)
            .map_err(|e| SSTableError::corrupt(&self.path, frame.offset, format!("malformed partition start: {}", e)))?;
        self.in_partition = true;
        Ok(Some(PartitionHeader {
            key,
            deletion,
            offset: frame.offset,
        }))
    }

    /// Next record frame of the current partition, `None` at its end.
    pub fn next_record(&mut self) -> Result<Option<Frame>> {
        if !self.in_partition {
            return Ok(None);
        }
        let Some(frame) = self.read_frame()? else {
            return Err(SSTableError::corrupt(&self.path, self.offset(), "data ends inside a partition"));
        };
        match frame.kind {
            KIND_PARTITION_END => {
                self.in_partition = false;
                Ok(None)
            }
            KIND_PARTITION_START => Err(SSTableError::corrupt(
                &self.path,
                frame.offset,
                "partition start before the previous partition ended",
            )),
            _ => Ok(Some(frame)),
        }
    }

    /// Releases the file. Safe to call more than once.
    pub fn close(&mut self) {
        self.input = None;
        self.in_partition = false;
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(input) = self.input.as_mut() else {
            return Ok(None);
        };
        let offset = input.offset;
        let frame = read_frame(input, &self.path, offset)?;
        if let Some(f) = &frame {
            debug_assert_eq!(input.offset, offset + frame_len(f));
        }
        Ok(frame)
    }

    fn verify_digest(&self) -> Result<()> {
        let (Some(expected), Some(input)) = (self.expected_digest, self.input.as_ref()) else {
            return Ok(());
        };
        let actual = input.digest.clone().finalize();
        if actual != expected {
            return Err(SSTableError::corrupt(
                &self.path,
                input.offset,
                format!("data digest mismatch: expected {}, computed {}", expected, actual),
            ));
        }
        Ok(())
    }
}
