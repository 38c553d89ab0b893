use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, SSTableError};
use crate::version::Version;

/// One file of an SSTable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Data,
    Index,
    Summary,
    Statistics,
    Filter,
    Digest,
    Toc,
}

impl Component {
    /// Every component a complete SSTable has, `TOC.txt` last.
    pub const ALL: [Component; 7] = [
        Component::Data,
        Component::Index,
        Component::Summary,
        Component::Statistics,
        Component::Filter,
        Component::Digest,
        Component::Toc,
    ];

    pub fn file_suffix(&self) -> &'static str {
        match self {
            Component::Data => "Data.db",
            Component::Index => "Index.db",
            Component::Summary => "Summary.db",
            Component::Statistics => "Statistics.db",
            Component::Filter => "Filter.db",
            Component::Digest => "Digest.crc32",
            Component::Toc => "TOC.txt",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Component> {
        Component::ALL.iter().copied().find(|c| c.file_suffix() == suffix)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_suffix())
    }
}

/// Identity of an SSTable: where it lives and what its component files are
/// called.
///
/// `jb`/`ka` files are named `<ks>-<table>-<version>-<generation>-<Component>`;
/// later versions are named `<version>-<generation>-big-<Component>` and take
/// keyspace and table from the `<ks>/<table>[-<id>]/` directories above them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub directory: PathBuf,
    pub keyspace: String,
    pub table: String,
    pub version: Version,
    pub generation: u64,
}

impl Descriptor {
    pub fn new(
        directory: impl Into<PathBuf>,
        keyspace: impl Into<String>,
        table: impl Into<String>,
        version: Version,
        generation: u64,
    ) -> Self {
        Self {
            directory: directory.into(),
            keyspace: keyspace.into(),
            table: table.into(),
            version,
            generation,
        }
    }

    /// Parses a component path.
    ///
    /// # Errors
    ///
    /// [`SSTableError::InvalidFilename`] when the name follows neither naming
    /// scheme (or, for the directory-based scheme, there are no keyspace and
    /// table directories above the file); [`SSTableError::UnsupportedVersion`]
    /// when the name is well formed but carries an unknown version tag.
    pub fn from_path(path: &Path) -> Result<(Descriptor, Component)> {
        let invalid = || SSTableError::InvalidFilename(path.to_path_buf());
        let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let parts: Vec<&str> = name.split('-').collect();

        match parts.as_slice() {
            [version, generation, "big", suffix] => {
                let component = Component::from_suffix(suffix).ok_or_else(invalid)?;
                let generation = generation.parse::<u64>().map_err(|_| invalid())?;
                let version = version.parse::<Version>()?;
                let table_dir = dir_name(&directory).ok_or_else(invalid)?;
                let table = table_dir.split('-').next().unwrap_or(table_dir);
                let keyspace = directory
                    .parent()
                    .and_then(dir_name)
                    .ok_or_else(invalid)?;
                Ok((
                    Descriptor::new(directory.clone(), keyspace, table, version, generation),
                    component,
                ))
            }
            [keyspace, table, version, generation, suffix] => {
                let component = Component::from_suffix(suffix).ok_or_else(invalid)?;
                let generation = generation.parse::<u64>().map_err(|_| invalid())?;
                let version = version.parse::<Version>()?;
                if keyspace.is_empty() || table.is_empty() {
                    return Err(invalid());
                }
                Ok((
                    Descriptor::new(directory.clone(), *keyspace, *table, version, generation),
                    component,
                ))
            }
            _ => Err(invalid()),
        }
    }

    pub fn filename_for(&self, component: Component) -> String {
        if self.version.uses_legacy_naming() {
            format!(
                "{}-{}-{}-{}-{}",
                self.keyspace,
                self.table,
                self.version,
                self.generation,
                component.file_suffix()
            )
        } else {
            format!("{}-{}-big-{}", self.version, self.generation, component.file_suffix())
        }
    }

    pub fn path_for(&self, component: Component) -> PathBuf {
        self.directory.join(self.filename_for(component))
    }

    /// Where a writer stages `component` before the final rename.
    pub fn tmp_path_for(&self, component: Component) -> PathBuf {
        self.directory.join(format!("{}.tmp", self.filename_for(component)))
    }

    /// Same identity, other directory.
    pub fn with_directory(&self, directory: impl Into<PathBuf>) -> Descriptor {
        Descriptor {
            directory: directory.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_for(Component::Data).display())
    }
}

fn dir_name(dir: &Path) -> Option<&str> {
    dir.file_name().and_then(|n| n.to_str()).filter(|n| !n.is_empty())
}
