use crc32fast::Hasher as Crc32;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

use rows::{DeletionTime, Unfiltered};
use schema::{DecoratedKey, Partitioner};

use crate::descriptor::{Component, Descriptor};
use crate::encoding::{check_len, encode_partition_start, MAX_KEY_BYTES};
use crate::error::{Result, SSTableError};
use crate::filter::PartitionFilter;
use crate::format::{write_data_header, DATA_HEADER_BYTES};
use crate::frame::{write_frame, KIND_PARTITION_END, KIND_PARTITION_START, MAX_PAYLOAD_BYTES};
use crate::index::IndexWriter;
use crate::legacy::Atom;
use crate::modern::ModernCodec;
use crate::stats::{SerializationHeader, StatsCollector};
use crate::summary::SummaryBuilder;
use crate::version::FormatGeneration;

/// Tuning for [`SSTableWriter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriterOptions {
    /// Capacity of the data and index write buffers.
    pub buffer_size: usize,
    /// One summary sample every `index_interval` partitions.
    pub index_interval: usize,
    pub bloom_fp_chance: f64,
    /// fsync every component before it is renamed into place.
    pub sync: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,
            index_interval: 128,
            bloom_fp_chance: 0.01,
            sync: true,
        }
    }
}

/// Data file plus the running offset and digest of everything written to it.
struct DataOut {
    out: BufWriter<File>,
    offset: u64,
    digest: Crc32,
}

impl Write for DataOut {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.out.write(buf)?;
        self.digest.update(&buf[..n]);
        self.offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Streams partitions into a new SSTable.
///
/// Every component is written to a `.tmp` sibling first. [`finish`] fsyncs
/// them (unless disabled), then renames them into place with `TOC.txt` last,
/// so a table whose TOC exists is complete. A writer that is dropped or
/// [`abort`]ed before `finish` removes its temporaries.
///
/// Partitions must arrive in strictly increasing partitioner order.
///
/// [`finish`]: SSTableWriter::finish
/// [`abort`]: SSTableWriter::abort
pub struct SSTableWriter {
    descriptor: Descriptor,
    partitioner: Partitioner,
    options: WriterOptions,
    codec: Option<ModernCodec>,
    data: DataOut,
    index: IndexWriter,
    summary: SummaryBuilder,
    filter: PartitionFilter,
    stats: StatsCollector,
    last_key: Option<DecoratedKey>,
    in_partition: bool,
    done: bool,
}

impl SSTableWriter {
    /// Creates the data and index temporaries for `descriptor`.
    ///
    /// Modern versions need the serialization `header` their rows are
    /// encoded against; legacy versions take none. `expected_keys` sizes the
    /// bloom filter.
    pub fn create(
        descriptor: &Descriptor,
        partitioner: Partitioner,
        header: Option<SerializationHeader>,
        expected_keys: u64,
        options: WriterOptions,
    ) -> Result<Self> {
        let codec = match (descriptor.version.generation(), header.clone()) {
            (FormatGeneration::Modern, Some(h)) => Some(ModernCodec::new(h)?),
            (FormatGeneration::Modern, None) => {
                return Err(SSTableError::State("modern sstables need a serialization header"))
            }
            (FormatGeneration::Legacy, Some(_)) => {
                return Err(SSTableError::State("legacy sstables carry no serialization header"))
            }
            (FormatGeneration::Legacy, None) => None,
        };
        let filter = PartitionFilter::new(expected_keys, options.bloom_fp_chance)?;

        fs::create_dir_all(&descriptor.directory).map_err(|e| SSTableError::io(&descriptor.directory, e))?;

        let data_tmp = descriptor.tmp_path_for(Component::Data);
        let file = create_file(&data_tmp)?;
        let mut data = DataOut {
            out: BufWriter::with_capacity(options.buffer_size.max(1), file),
            offset: 0,
            digest: Crc32::new(),
        };
        write_data_header(&mut data, descriptor.version).map_err(|e| SSTableError::io(&data_tmp, e))?;
        debug_assert_eq!(data.offset, DATA_HEADER_BYTES);

        let index = IndexWriter::create(&descriptor.tmp_path_for(Component::Index), options.buffer_size.max(1))?;

        Ok(Self {
            descriptor: descriptor.clone(),
            partitioner,
            options,
            codec,
            data,
            index,
            summary: SummaryBuilder::new(options.index_interval),
            filter,
            stats: StatsCollector::new(descriptor.version, partitioner, header),
            last_key: None,
            in_partition: false,
            done: false,
        })
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Partitions started so far.
    pub fn partition_count(&self) -> u64 {
        self.index.count()
    }

    /// Bytes of `Data.db` written so far.
    pub fn data_offset(&self) -> u64 {
        self.data.offset
    }

    /// Starts a partition. Keys must be strictly increasing in partitioner
    /// order.
    pub fn begin_partition(&mut self, key: &[u8], deletion: &DeletionTime) -> Result<()> {
        if self.in_partition {
            return Err(SSTableError::State("previous partition still open"));
        }
        check_len("partition key", key.len(), MAX_KEY_BYTES)?;
        let decorated = self.partitioner.decorate(key);
        if let Some(last) = &self.last_key {
            if *last >= decorated {
                return Err(SSTableError::OutOfOrder {
                    path: self.descriptor.path_for(Component::Data),
                });
            }
        }

        let data_offset = self.data.offset;
        let index_offset = self.index.append(key, data_offset)?;
        self.summary.add(key, index_offset);
        self.filter.insert(key);
        self.stats.update_partition(key, deletion);

        let payload = encode_partition_start(key, deletion);
        self.write(KIND_PARTITION_START, &payload)?;
        self.last_key = Some(decorated);
        self.in_partition = true;
        Ok(())
    }

    /// Appends a row or range tombstone marker to the open partition of a
    /// modern sstable.
    pub fn write_unfiltered(&mut self, unfiltered: &Unfiltered) -> Result<()> {
        if !self.in_partition {
            return Err(SSTableError::State("no partition open"));
        }
        let Some(codec) = &self.codec else {
            return Err(SSTableError::WrongGeneration("row"));
        };
        let (kind, payload) = codec.encode(unfiltered)?;
        match unfiltered {
            Unfiltered::Row(row) => self.stats.update_row(row),
            Unfiltered::Marker(marker) => self.stats.update_marker(marker),
        }
        self.write(kind, &payload)
    }

    /// Appends an atom to the open partition of a legacy sstable.
    pub fn write_atom(&mut self, atom: &Atom) -> Result<()> {
        if !self.in_partition {
            return Err(SSTableError::State("no partition open"));
        }
        if self.codec.is_some() {
            return Err(SSTableError::WrongGeneration("atom"));
        }
        let (kind, payload) = atom.encode()?;
        self.stats.update_atom(atom);
        self.write(kind, &payload)
    }

    pub fn end_partition(&mut self) -> Result<()> {
        if !self.in_partition {
            return Err(SSTableError::State("no partition open"));
        }
        self.write(KIND_PARTITION_END, &[])?;
        self.in_partition = false;
        Ok(())
    }

    /// Writes the remaining components and renames everything into place.
    /// Returns the descriptor of the finished table.
    pub fn finish(mut self) -> Result<Descriptor> {
        if self.in_partition {
            return Err(SSTableError::State("partition still open at finish"));
        }
        let d = self.descriptor.clone();
        let sync = self.options.sync;

        let data_tmp = d.tmp_path_for(Component::Data);
        self.data.flush().map_err(|e| SSTableError::io(&data_tmp, e))?;
        if sync {
            self.data.out.get_ref().sync_all().map_err(|e| SSTableError::io(&data_tmp, e))?;
        }
        let digest = self.data.digest.clone().finalize();
        let data_len = self.data.offset;

        write_component(&d.tmp_path_for(Component::Digest), digest.to_string().as_bytes(), sync)?;
        self.index.finish(sync)?;
        write_component(&d.tmp_path_for(Component::Summary), &self.summary.build().encode(), sync)?;
        write_component(&d.tmp_path_for(Component::Filter), &self.filter.to_bytes(), sync)?;

        let stats = self.stats.snapshot();
        let stats_json = stats.to_json()?;
        write_component(&d.tmp_path_for(Component::Statistics), &stats_json, sync)?;

        let toc: String = Component::ALL
            .iter()
            .map(|c| format!("{}\n", c.file_suffix()))
            .collect();
        write_component(&d.tmp_path_for(Component::Toc), toc.as_bytes(), sync)?;

        let mut renamed = Vec::new();
        for component in Component::ALL {
            let (from, to) = (d.tmp_path_for(component), d.path_for(component));
            if let Err(e) = fs::rename(&from, &to) {
                for path in &renamed {
                    let _ = fs::remove_file(path);
                }
                return Err(SSTableError::io(&to, e));
            }
            renamed.push(to);
        }
        if sync {
            sync_dir(&d.directory);
        }
        self.done = true;

        debug!(
            sstable = %d,
            partitions = stats.partition_count,
            rows = stats.row_count,
            bytes = data_len,
            "sstable written"
        );
        Ok(d)
    }

    /// Drops the table without publishing it.
    pub fn abort(mut self) {
        self.remove_temporaries();
        self.done = true;
    }

    fn write(&mut self, kind: u8, payload: &[u8]) -> Result<()> {
        check_len("record payload", payload.len(), MAX_PAYLOAD_BYTES)?;
        write_frame(&mut self.data, kind, payload)
            .map(|_| ())
            .map_err(|e| SSTableError::io(self.descriptor.tmp_path_for(Component::Data), e))
    }

    fn remove_temporaries(&self) {
        for component in Component::ALL {
            let path = self.descriptor.tmp_path_for(component);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove temporary"),
            }
        }
    }
}

impl Drop for SSTableWriter {
    fn drop(&mut self) {
        if !self.done {
            self.remove_temporaries();
        }
    }
}

fn create_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| SSTableError::io(path, e))
}

fn write_component(path: &Path, bytes: &[u8], sync: bool) -> Result<()> {
    let mut file = create_file(path)?;
    file.write_all(bytes).map_err(|e| SSTableError::io(path, e))?;
    if sync {
        file.sync_all().map_err(|e| SSTableError::io(path, e))?;
    }
    Ok(())
}

/// Best effort: not every platform lets a directory be fsynced.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}
