//! Fixture tables written with the codec's own writer.

use std::path::Path;

use rows::{Clustering, DeletionTime, Unfiltered};
use schema::{parse_create_table, Partitioner, TableSchema};
use sstable::{Atom, Descriptor, SSTableReader, SSTableWriter, SerializationHeader, Version, WriterOptions};

pub const TABLE_CQL: &str = "CREATE TABLE ks.t (
    k blob,
    c int,
    v int,
    d int,
    s int static,
    tags set<text>,
    PRIMARY KEY (k, c)
) WITH default_time_to_live = 10";

pub type ModernPartition = (Vec<u8>, DeletionTime, Vec<Unfiltered>);
pub type LegacyPartition = (Vec<u8>, DeletionTime, Vec<Atom>);

pub fn table_schema() -> anyhow::Result<TableSchema> {
    Ok(parse_create_table(TABLE_CQL, None)?.with_partitioner(Partitioner::ByteOrdered))
}

pub fn ck(c: i32) -> Vec<u8> {
    c.to_be_bytes().to_vec()
}

pub fn int(v: i32) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn clustering(c: i32) -> Clustering {
    Clustering::regular(vec![ck(c)])
}

fn options() -> WriterOptions {
    WriterOptions {
        sync: false,
        ..WriterOptions::default()
    }
}

/// Writes `mc` generation 1 of `ks.t` under `<root>/source/ks/t`. Keys must be
/// in byte order.
pub fn modern_table(root: &Path, partitions: &[ModernPartition]) -> anyhow::Result<SSTableReader> {
    let descriptor = Descriptor::new(root.join("source").join("ks").join("t"), "ks", "t", Version::Mc, 1);
    write_modern(&descriptor, partitions)
}

pub fn write_modern(descriptor: &Descriptor, partitions: &[ModernPartition]) -> anyhow::Result<SSTableReader> {
    let header = SerializationHeader::from_schema(&table_schema()?);
    let mut w = SSTableWriter::create(
        descriptor,
        Partitioner::ByteOrdered,
        Some(header),
        partitions.len() as u64,
        options(),
    )?;
    for (key, deletion, entries) in partitions {
        w.begin_partition(key, deletion)?;
        for entry in entries {
            w.write_unfiltered(entry)?;
        }
        w.end_partition()?;
    }
    Ok(SSTableReader::open(&w.finish()?)?)
}

/// Writes `ka` generation 1 of `ks.t` under `<root>/source`.
pub fn legacy_table(root: &Path, partitions: &[LegacyPartition]) -> anyhow::Result<SSTableReader> {
    let descriptor = Descriptor::new(root.join("source"), "ks", "t", Version::Ka, 1);
    let mut w = SSTableWriter::create(
        &descriptor,
        Partitioner::ByteOrdered,
        None,
        partitions.len() as u64,
        options(),
    )?;
    for (key, deletion, atoms) in partitions {
        w.begin_partition(key, deletion)?;
        for atom in atoms {
            w.write_atom(atom)?;
        }
        w.end_partition()?;
    }
    Ok(SSTableReader::open(&w.finish()?)?)
}
