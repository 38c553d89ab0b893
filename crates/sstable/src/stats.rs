//! `Statistics.db`: per-file metadata stored as JSON.

use std::fs;
use std::path::Path;

use rows::{Cell, CellState, Clustering, DeletionTime, LivenessInfo, RangeTombstoneMarker, Row};
use schema::{ClusteringOrder, ColumnDef, ColumnKind, CqlType, Partitioner, SchemaError, TableSchema};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SSTableError};
use crate::legacy::Atom;
use crate::version::Version;

/// One column as recorded in a serialization header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub cql_type: String,
    /// Clustering columns only: stored in descending order.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reversed: bool,
}

/// The table layout a modern SSTable was written with. Rows refer to
/// columns by their position in `static_columns` / `regular_columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SerializationHeader {
    pub partition_key: Vec<HeaderColumn>,
    pub clustering: Vec<HeaderColumn>,
    pub static_columns: Vec<HeaderColumn>,
    pub regular_columns: Vec<HeaderColumn>,
}

impl SerializationHeader {
    pub fn from_schema(schema: &TableSchema) -> Self {
        let col = |c: &ColumnDef| HeaderColumn {
            name: c.name.clone(),
            cql_type: c.cql_type.to_string(),
            reversed: c.order == ClusteringOrder::Desc,
        };
        Self {
            partition_key: schema.partition_key_columns().into_iter().map(col).collect(),
            clustering: schema.clustering_columns().into_iter().map(col).collect(),
            static_columns: schema.static_columns().map(col).collect(),
            regular_columns: schema.regular_columns().map(col).collect(),
        }
    }

    /// Rebuilds the table schema the header describes.
    pub fn to_schema(
        &self,
        keyspace: &str,
        table: &str,
        partitioner: Partitioner,
    ) -> std::result::Result<TableSchema, SchemaError> {
        let mut columns = Vec::new();
        for (i, c) in self.partition_key.iter().enumerate() {
            columns.push(ColumnDef::new(&c.name, c.cql_type.parse::<CqlType>()?, ColumnKind::PartitionKey(i)));
        }
        for (i, c) in self.clustering.iter().enumerate() {
            let mut def = ColumnDef::new(&c.name, c.cql_type.parse::<CqlType>()?, ColumnKind::Clustering(i));
            if c.reversed {
                def.order = ClusteringOrder::Desc;
            }
            columns.push(def);
        }
        for c in &self.static_columns {
            columns.push(ColumnDef::new(&c.name, c.cql_type.parse::<CqlType>()?, ColumnKind::Static));
        }
        for c in &self.regular_columns {
            columns.push(ColumnDef::new(&c.name, c.cql_type.parse::<CqlType>()?, ColumnKind::Regular));
        }
        TableSchema::new(keyspace, table, columns, partitioner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsMetadata {
    pub version: String,
    pub partitioner: String,
    pub partition_count: u64,
    pub row_count: u64,
    pub cell_count: u64,
    pub expiring_cell_count: u64,
    pub tombstone_count: u64,
    pub range_tombstone_count: u64,
    pub min_timestamp: Option<i64>,
    pub max_timestamp: Option<i64>,
    pub min_local_deletion_time: Option<i32>,
    pub max_local_deletion_time: Option<i32>,
    pub max_ttl: i32,
    /// Hex encoded.
    pub first_key: Option<String>,
    /// Hex encoded.
    pub last_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<SerializationHeader>,
}

impl StatsMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| SSTableError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|source| SSTableError::Stats {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|source| SSTableError::Stats {
            path: Default::default(),
            source,
        })
    }

    pub fn partitioner(&self) -> std::result::Result<Partitioner, SchemaError> {
        Partitioner::from_name(&self.partitioner)
    }

    pub fn first_key_bytes(&self) -> Option<Vec<u8>> {
        self.first_key.as_deref().and_then(|k| hex::decode(k).ok())
    }

    pub fn last_key_bytes(&self) -> Option<Vec<u8>> {
        self.last_key.as_deref().and_then(|k| hex::decode(k).ok())
    }
}

/// Accumulates [`StatsMetadata`] while a writer streams partitions.
#[derive(Debug)]
pub struct StatsCollector {
    stats: StatsMetadata,
    last_atom_clustering: Option<Clustering>,
}

impl StatsCollector {
    pub fn new(version: Version, partitioner: Partitioner, header: Option<SerializationHeader>) -> Self {
        Self {
            stats: StatsMetadata {
                version: version.tag().to_string(),
                partitioner: partitioner.name().to_string(),
                partition_count: 0,
                row_count: 0,
                cell_count: 0,
                expiring_cell_count: 0,
                tombstone_count: 0,
                range_tombstone_count: 0,
                min_timestamp: None,
                max_timestamp: None,
                min_local_deletion_time: None,
                max_local_deletion_time: None,
                max_ttl: 0,
                first_key: None,
                last_key: None,
                header,
            },
            last_atom_clustering: None,
        }
    }

    pub fn update_partition(&mut self, key: &[u8], deletion: &DeletionTime) {
        let s = &mut self.stats;
        s.partition_count += 1;
        let hex_key = hex::encode(key);
        if s.first_key.is_none() {
            s.first_key = Some(hex_key.clone());
        }
        s.last_key = Some(hex_key);
        self.last_atom_clustering = None;
        self.update_deletion(deletion);
    }

    pub fn update_row(&mut self, row: &Row) {
        self.stats.row_count += 1;
        self.update_liveness(&row.liveness);
        self.update_deletion(&row.deletion);
        for column in &row.columns {
            if let rows::ColumnData::Complex(c) = column {
                self.update_deletion(&c.deletion);
            }
        }
        for cell in row.cells() {
            self.update_cell(cell);
        }
    }

    pub fn update_marker(&mut self, marker: &RangeTombstoneMarker) {
        if marker.is_close() {
            self.stats.range_tombstone_count += 1;
        }
        if let Some(d) = marker.open_deletion() {
            self.update_deletion(&d);
        }
        if let Some(d) = marker.close_deletion() {
            self.update_deletion(&d);
        }
    }

    pub fn update_atom(&mut self, atom: &Atom) {
        match atom {
            Atom::Cell { clustering, cell } => {
                self.count_atom_row(clustering);
                self.update_cell(cell);
            }
            Atom::RowMarker {
                clustering,
                liveness,
                deletion,
            } => {
                self.count_atom_row(clustering);
                self.update_liveness(liveness);
                self.update_deletion(deletion);
            }
            Atom::RangeTombstone(rt) => {
                self.stats.range_tombstone_count += 1;
                self.update_deletion(&rt.deletion);
            }
        }
    }

    /// Metadata accumulated so far.
    pub fn snapshot(&self) -> StatsMetadata {
        self.stats.clone()
    }

    fn count_atom_row(&mut self, clustering: &Clustering) {
        if self.last_atom_clustering.as_ref() != Some(clustering) {
            self.stats.row_count += 1;
            self.last_atom_clustering = Some(clustering.clone());
        }
    }

    fn update_cell(&mut self, cell: &Cell) {
        self.stats.cell_count += 1;
        self.update_timestamp(cell.timestamp);
        match cell.state {
            CellState::Live => {}
            CellState::Expiring(e) => {
                self.stats.expiring_cell_count += 1;
                self.stats.max_ttl = self.stats.max_ttl.max(e.ttl);
                self.update_local_deletion_time(e.local_expiration_time);
            }
            CellState::Tombstone { local_deletion_time } => {
                self.stats.tombstone_count += 1;
                self.update_local_deletion_time(local_deletion_time);
            }
        }
    }

    fn update_liveness(&mut self, liveness: &LivenessInfo) {
        if liveness.is_empty() {
            return;
        }
        self.update_timestamp(liveness.timestamp);
        if let Some(e) = liveness.expiration {
            self.stats.max_ttl = self.stats.max_ttl.max(e.ttl);
            self.update_local_deletion_time(e.local_expiration_time);
        }
    }

    fn update_deletion(&mut self, deletion: &DeletionTime) {
        if deletion.is_live() {
            return;
        }
        self.update_timestamp(deletion.marked_for_delete_at);
        self.update_local_deletion_time(deletion.local_deletion_time);
    }

    fn update_timestamp(&mut self, ts: i64) {
        let s = &mut self.stats;
        s.min_timestamp = Some(s.min_timestamp.map_or(ts, |m| m.min(ts)));
        s.max_timestamp = Some(s.max_timestamp.map_or(ts, |m| m.max(ts)));
    }

    fn update_local_deletion_time(&mut self, ldt: i32) {
        let s = &mut self.stats;
        s.min_local_deletion_time = Some(s.min_local_deletion_time.map_or(ldt, |m| m.min(ldt)));
        s.max_local_deletion_time = Some(s.max_local_deletion_time.map_or(ldt, |m| m.max(ldt)));
    }
}
