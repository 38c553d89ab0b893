//! Table schemas for SSTable rewriting.
//!
//! A [`TableSchema`] describes the columns of one table, how its clustering
//! keys sort and which partitioner laid its partitions out. Schemas are built
//! from CQL `CREATE TABLE` statements, either one at a time with
//! [`parse_create_table`] or in bulk through a [`SchemaCatalog`].
//!
//! ```
//! use schema::{parse_create_table, ColumnKind};
//!
//! let table = parse_create_table(
//!     "CREATE TABLE ks.events (id uuid, at timestamp, v int, PRIMARY KEY (id, at))",
//!     None,
//! )
//! .unwrap();
//! assert_eq!(table.column("at").unwrap().kind, ColumnKind::Clustering(0));
//! ```

mod catalog;
mod comparator;
mod cql;
mod error;
mod partitioner;
mod table;
mod types;

pub use catalog::SchemaCatalog;
pub use comparator::ClusteringComparator;
pub use cql::{parse_create_table, parse_statement, parse_type, split_statements, Statement};
pub use error::SchemaError;
pub use partitioner::{DecoratedKey, Partitioner, Token};
pub use table::{ClusteringOrder, ColumnDef, ColumnKind, TableSchema};
pub use types::CqlType;
