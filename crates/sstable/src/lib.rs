//! # SSTable: on-disk sorted string tables
//!
//! Reading and writing the immutable table files the TTL remover consumes
//! and produces. One table is a set of components sharing a
//! [`Descriptor`] (directory, keyspace, table, version, generation):
//!
//! ```text
//! Data.db        partitions in partitioner order, as CRC-checked frames
//! Index.db       key -> Data.db offset, one entry per partition
//! Summary.db     every Nth index entry, first and last key
//! Filter.db      bloom filter over partition keys
//! Statistics.db  JSON metadata (counts, timestamps, serialization header)
//! Digest.crc32   crc32 of Data.db, decimal
//! TOC.txt        component list; written last, its presence marks completion
//! ```
//!
//! ## Data.db
//!
//! ```text
//! [magic "SST1"][version tag: 2 bytes]
//! ( [partition start] (record)* [partition end] )*
//! ```
//!
//! Each partition and record is one [`frame`]. The records differ between
//! the two format generations:
//!
//! - **legacy** (`jb`, `ka`, `la`): a flat stream of [`Atom`]s, one per cell,
//!   row marker or range tombstone ([`legacy`]).
//! - **modern** (`ma`..`nb`): whole rows and range tombstone markers encoded
//!   against the [`SerializationHeader`] in `Statistics.db` ([`modern`]).
//!
//! All integers are little-endian.

mod descriptor;
mod encoding;
mod error;
mod filter;
mod format;
pub mod frame;
mod index;
pub mod legacy;
pub mod modern;
mod reader;
mod stats;
mod summary;
mod version;
mod writer;

pub use descriptor::{Component, Descriptor};
pub use error::{Result, SSTableError};
pub use filter::PartitionFilter;
pub use format::{DATA_HEADER_BYTES, DATA_MAGIC};
pub use frame::Frame;
pub use index::{IndexEntry, KeyIterator};
pub use legacy::Atom;
pub use modern::ModernCodec;
pub use reader::{DataCursor, DiskAccessMode, PartitionHeader, SSTableReader};
pub use stats::{HeaderColumn, SerializationHeader, StatsCollector, StatsMetadata};
pub use summary::{Summary, SummaryBuilder};
pub use version::{FormatGeneration, Version};
pub use writer::{SSTableWriter, WriterOptions};
