//! Finds the table schema a source file is interpreted with.

use std::sync::Arc;

use schema::{parse_create_table, ColumnKind, SchemaCatalog, TableSchema};
use sstable::{SSTableReader, SerializationHeader};
use tracing::debug;

use crate::adapter::{missing_header, FormatStrategy};
use crate::error::{Result, RewriteError};

/// Where table definitions come from.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// Tables loaded from CQL scripts, looked up by keyspace and table.
    Catalog(Arc<SchemaCatalog>),
    /// One `CREATE TABLE` statement. An unqualified table name takes the
    /// keyspace of the file being rewritten.
    Statement(String),
    /// The serialization header embedded in modern files.
    SelfDescribing,
}

impl SchemaSource {
    /// Resolves the schema of `source`.
    ///
    /// The partitioner recorded in the file's statistics always wins over the
    /// one of the definition. For modern files the definition must cover
    /// every column of the file's serialization header.
    pub fn resolve(&self, source: &SSTableReader, strategy: FormatStrategy) -> Result<Arc<TableSchema>> {
        let d = source.descriptor();
        let table = format!("{}.{}", d.keyspace, d.table);

        let schema = match self {
            SchemaSource::Catalog(catalog) => {
                let schema = catalog.get(&d.keyspace, &d.table).map_err(|e| RewriteError::schema(&table, e))?;
                (*schema).clone()
            }
            SchemaSource::Statement(cql) => {
                let schema =
                    parse_create_table(cql, Some(&d.keyspace)).map_err(|e| RewriteError::schema(&table, e))?;
                if schema.keyspace != d.keyspace || schema.name != d.table {
                    return Err(RewriteError::schema(
                        &table,
                        format!("statement defines {}", schema.qualified_name()),
                    ));
                }
                schema
            }
            SchemaSource::SelfDescribing => {
                if !strategy.is_self_describing() {
                    return Err(RewriteError::schema(
                        &table,
                        format!("{} files embed no schema, pass a CREATE TABLE statement or a schema directory", d.version),
                    ));
                }
                let header = source.stats().header.as_ref().ok_or_else(|| missing_header(source))?;
                let partitioner = source.stats().partitioner().map_err(|e| RewriteError::schema(&table, e))?;
                header
                    .to_schema(&d.keyspace, &d.table, partitioner)
                    .map_err(|e| RewriteError::schema(&table, e))?
            }
        };

        let partitioner = source.stats().partitioner().map_err(|e| RewriteError::schema(&table, e))?;
        if partitioner != schema.partitioner() {
            debug!(
                table = %table,
                schema = schema.partitioner().name(),
                file = partitioner.name(),
                "using the partitioner recorded in the file"
            );
        }
        let schema = schema.with_partitioner(partitioner);

        if strategy == FormatStrategy::Modern {
            let header = source.stats().header.as_ref().ok_or_else(|| missing_header(source))?;
            check_header(&schema, header).map_err(|reason| RewriteError::schema(&table, reason))?;
        }
        Ok(Arc::new(schema))
    }
}

fn check_header(schema: &TableSchema, header: &SerializationHeader) -> std::result::Result<(), String> {
    if header.clustering.len() != schema.clustering_size() {
        return Err(format!(
            "file has {} clustering columns, schema has {}",
            header.clustering.len(),
            schema.clustering_size()
        ));
    }
    let columns = header
        .static_columns
        .iter()
        .map(|c| (c, true))
        .chain(header.regular_columns.iter().map(|c| (c, false)));
    for (column, is_static) in columns {
        let def = schema
            .column(&column.name)
            .ok_or_else(|| format!("column {} is not in the schema", column.name))?;
        let matches_kind = match def.kind {
            ColumnKind::Static => is_static,
            ColumnKind::Regular => !is_static,
            _ => false,
        };
        if !matches_kind {
            return Err(format!("column {} has a different kind in the schema", column.name));
        }
    }
    Ok(())
}
