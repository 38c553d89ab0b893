use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cql::{parse_statement, split_statements, Statement};
use crate::error::SchemaError;
use crate::table::TableSchema;

/// In-memory set of table schemas, keyed by `(keyspace, table)`.
///
/// Schemas are handed out as `Arc` so one definition can be shared by every
/// file of a table being rewritten concurrently.
#[derive(Debug, Default, Clone)]
pub struct SchemaCatalog {
    keyspaces: BTreeSet<String>,
    tables: HashMap<(String, String), Arc<TableSchema>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a table. Its keyspace becomes known.
    pub fn register(&mut self, schema: TableSchema) {
        self.keyspaces.insert(schema.keyspace.clone());
        let key = (schema.keyspace.clone(), schema.name.clone());
        self.tables.insert(key, Arc::new(schema));
    }

    pub fn add_keyspace(&mut self, keyspace: impl Into<String>) {
        self.keyspaces.insert(keyspace.into());
    }

    /// Loads a CQL script. `USE` switches the keyspace used for unqualified
    /// table names; statements other than `CREATE TABLE`, `CREATE KEYSPACE`
    /// and `USE` are ignored. Returns the number of tables registered.
    pub fn load_statements(&mut self, script: &str) -> Result<usize, SchemaError> {
        let mut current: Option<String> = None;
        let mut loaded = 0;
        for stmt in split_statements(script) {
            match parse_statement(stmt, current.as_deref())? {
                Statement::Use(ks) => current = Some(ks),
                Statement::CreateKeyspace(ks) => self.add_keyspace(ks),
                Statement::CreateTable(table) => {
                    debug!(table = %table.qualified_name(), "registered table schema");
                    self.register(table);
                    loaded += 1;
                }
                Statement::Other => {}
            }
        }
        Ok(loaded)
    }

    /// Loads every `*.cql` file directly inside `dir`, in file name order.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, SchemaError> {
        let io_err = |source| SchemaError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == "cql") {
                files.push(path);
            }
        }
        files.sort();

        let mut loaded = 0;
        for path in files {
            let script = fs::read_to_string(&path).map_err(|source| SchemaError::Io {
                path: path.clone(),
                source,
            })?;
            loaded += self.load_statements(&script)?;
        }
        info!(dir = %dir.display(), tables = loaded, "loaded schema catalog");
        Ok(loaded)
    }

    /// # Errors
    ///
    /// [`SchemaError::KeyspaceNotFound`] when nothing is known about the
    /// keyspace, [`SchemaError::TableNotFound`] when the keyspace is known but
    /// the table is not.
    pub fn get(&self, keyspace: &str, table: &str) -> Result<Arc<TableSchema>, SchemaError> {
        if let Some(schema) = self.tables.get(&(keyspace.to_string(), table.to_string())) {
            return Ok(Arc::clone(schema));
        }
        if self.keyspaces.contains(keyspace) {
            Err(SchemaError::TableNotFound {
                keyspace: keyspace.to_string(),
                table: table.to_string(),
            })
        } else {
            Err(SchemaError::KeyspaceNotFound(keyspace.to_string()))
        }
    }

    pub fn has_keyspace(&self, keyspace: &str) -> bool {
        self.keyspaces.contains(keyspace)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    const SCRIPT: &str = "
        CREATE KEYSPACE my_keyspace WITH replication = {'class': 'SimpleStrategy', 'replication_factor': 1};
        USE my_keyspace;
        CREATE TABLE timeseries (id uuid, ts timestamp, value int, PRIMARY KEY (id, ts));
        CREATE INDEX ON timeseries (value);
        CREATE TABLE other.users (name text PRIMARY KEY);
    ";

    #[test]
    fn loads_script_and_resolves_tables() -> Result<()> {
        let mut catalog = SchemaCatalog::new();
        assert_eq!(catalog.load_statements(SCRIPT)?, 2);
        assert_eq!(catalog.len(), 2);

        let t = catalog.get("my_keyspace", "timeseries")?;
        assert_eq!(t.clustering_size(), 1);
        assert!(catalog.get("other", "users").is_ok());
        Ok(())
    }

    #[test]
    fn distinguishes_missing_keyspace_and_table() -> Result<()> {
        let mut catalog = SchemaCatalog::new();
        catalog.load_statements(SCRIPT)?;
        assert!(matches!(
            catalog.get("my_keyspace", "nope"),
            Err(SchemaError::TableNotFound { .. })
        ));
        assert!(matches!(
            catalog.get("ghost", "timeseries"),
            Err(SchemaError::KeyspaceNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn loads_cql_files_from_dir() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.cql"), "CREATE TABLE ks.a (k int PRIMARY KEY);")?;
        fs::write(dir.path().join("b.cql"), "CREATE TABLE ks.b (k int PRIMARY KEY);")?;
        fs::write(dir.path().join("notes.txt"), "CREATE TABLE ks.c (k int PRIMARY KEY);")?;

        let mut catalog = SchemaCatalog::new();
        assert_eq!(catalog.load_dir(dir.path())?, 2);
        assert!(catalog.has_keyspace("ks"));
        assert!(catalog.get("ks", "c").is_err());
        Ok(())
    }

    #[test]
    fn parse_errors_propagate() {
        let mut catalog = SchemaCatalog::new();
        let err = catalog.load_statements("CREATE TABLE ks.t (k int PRIMARY KEY").unwrap_err();
        assert!(matches!(err, SchemaError::Parse { .. }));
    }
}
