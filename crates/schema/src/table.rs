use std::collections::HashSet;

use crate::comparator::ClusteringComparator;
use crate::error::SchemaError;
use crate::partitioner::Partitioner;
use crate::types::CqlType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Component of the partition key, with its position.
    PartitionKey(usize),
    /// Clustering column, with its position.
    Clustering(usize),
    Static,
    Regular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClusteringOrder {
    #[default]
    Asc,
    Desc,
}

impl ClusteringOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusteringOrder::Asc => "ASC",
            ClusteringOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub cql_type: CqlType,
    pub kind: ColumnKind,
    /// Only meaningful for clustering columns.
    pub order: ClusteringOrder,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, cql_type: CqlType, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            cql_type,
            kind,
            order: ClusteringOrder::Asc,
        }
    }

    pub fn is_complex(&self) -> bool {
        self.cql_type.is_multi_cell()
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(
            self.kind,
            ColumnKind::PartitionKey(_) | ColumnKind::Clustering(_)
        )
    }
}

/// Definition of one table: what is needed to interpret and re-encode its
/// SSTables.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub keyspace: String,
    pub name: String,
    columns: Vec<ColumnDef>,
    partitioner: Partitioner,
    comparator: ClusteringComparator,
    /// `default_time_to_live` table option, when set.
    pub default_ttl: Option<i32>,
}

impl TableSchema {
    /// Validates and builds a schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when there is no partition key, when a
    /// column is declared twice, when primary key positions have gaps, when a
    /// primary key column is a non-frozen collection, or when static columns
    /// are declared on a table without clustering columns.
    pub fn new(
        keyspace: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<ColumnDef>,
        partitioner: Partitioner,
    ) -> Result<Self, SchemaError> {
        let keyspace = keyspace.into();
        let name = name.into();
        let qualified = format!("{}.{}", keyspace, name);

        let mut seen = HashSet::new();
        for c in &columns {
            if !seen.insert(c.name.as_str()) {
                return Err(SchemaError::invalid(&qualified, format!("duplicate column {}", c.name)));
            }
            if c.is_primary_key() && c.cql_type.is_multi_cell() {
                return Err(SchemaError::invalid(
                    &qualified,
                    format!("primary key column {} cannot be a non-frozen collection", c.name),
                ));
            }
        }

        let pk = positions(&columns, |k| match k {
            ColumnKind::PartitionKey(p) => Some(p),
            _ => None,
        });
        let ck = positions(&columns, |k| match k {
            ColumnKind::Clustering(p) => Some(p),
            _ => None,
        });
        if pk.is_empty() {
            return Err(SchemaError::invalid(&qualified, "missing partition key"));
        }
        if !is_dense(&pk) || !is_dense(&ck) {
            return Err(SchemaError::invalid(&qualified, "primary key positions are not contiguous"));
        }
        let has_static = columns.iter().any(|c| c.kind == ColumnKind::Static);
        if has_static && ck.is_empty() {
            return Err(SchemaError::invalid(
                &qualified,
                "static columns require at least one clustering column",
            ));
        }

        let mut clustering: Vec<&ColumnDef> = columns
            .iter()
            .filter(|c| matches!(c.kind, ColumnKind::Clustering(_)))
            .collect();
        clustering.sort_by_key(|c| match c.kind {
            ColumnKind::Clustering(p) => p,
            _ => usize::MAX,
        });
        let comparator = ClusteringComparator::new(
            clustering
                .iter()
                .map(|c| (c.cql_type.clone(), c.order))
                .collect(),
        );

        Ok(Self {
            keyspace,
            name,
            columns,
            partitioner,
            comparator,
            default_ttl: None,
        })
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.keyspace, self.name)
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn partitioner(&self) -> Partitioner {
        self.partitioner
    }

    pub fn comparator(&self) -> &ClusteringComparator {
        &self.comparator
    }

    /// Same schema, other partitioner.
    pub fn with_partitioner(mut self, partitioner: Partitioner) -> Self {
        self.partitioner = partitioner;
        self
    }

    pub fn partition_key_columns(&self) -> Vec<&ColumnDef> {
        self.sorted_by_position(|k| match k {
            ColumnKind::PartitionKey(p) => Some(p),
            _ => None,
        })
    }

    pub fn clustering_columns(&self) -> Vec<&ColumnDef> {
        self.sorted_by_position(|k| match k {
            ColumnKind::Clustering(p) => Some(p),
            _ => None,
        })
    }

    /// Static columns in declaration order.
    pub fn static_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.kind == ColumnKind::Static)
    }

    /// Regular columns in declaration order.
    pub fn regular_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.kind == ColumnKind::Regular)
    }

    pub fn clustering_size(&self) -> usize {
        self.comparator.size()
    }

    /// `true` when `name` is a non-frozen collection column.
    pub fn is_complex(&self, name: &str) -> bool {
        self.column(name).map(ColumnDef::is_complex).unwrap_or(false)
    }

    fn sorted_by_position(&self, pos: impl Fn(ColumnKind) -> Option<usize>) -> Vec<&ColumnDef> {
        let mut out: Vec<(usize, &ColumnDef)> = self
            .columns
            .iter()
            .filter_map(|c| pos(c.kind).map(|p| (p, c)))
            .collect();
        out.sort_by_key(|(p, _)| *p);
        out.into_iter().map(|(_, c)| c).collect()
    }
}

fn positions(columns: &[ColumnDef], pos: impl Fn(ColumnKind) -> Option<usize>) -> Vec<usize> {
    let mut out: Vec<usize> = columns.iter().filter_map(|c| pos(c.kind)).collect();
    out.sort_unstable();
    out
}

fn is_dense(sorted: &[usize]) -> bool {
    sorted.iter().enumerate().all(|(i, p)| i == *p)
}
