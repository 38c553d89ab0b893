use std::fmt;
use std::str::FromStr;

use crate::error::SSTableError;

/// Row model a version tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatGeneration {
    /// Cell atoms; no schema in the file.
    Legacy,
    /// Rows and range tombstone markers; serialization header in the statistics.
    Modern,
}

/// Two-letter format version tag found in component file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Version {
    Jb,
    Ka,
    La,
    Ma,
    Mb,
    Mc,
    Md,
    Me,
    Na,
    Nb,
}

impl Version {
    pub const ALL: [Version; 10] = [
        Version::Jb,
        Version::Ka,
        Version::La,
        Version::Ma,
        Version::Mb,
        Version::Mc,
        Version::Md,
        Version::Me,
        Version::Na,
        Version::Nb,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Version::Jb => "jb",
            Version::Ka => "ka",
            Version::La => "la",
            Version::Ma => "ma",
            Version::Mb => "mb",
            Version::Mc => "mc",
            Version::Md => "md",
            Version::Me => "me",
            Version::Na => "na",
            Version::Nb => "nb",
        }
    }

    pub fn generation(&self) -> FormatGeneration {
        match self {
            Version::Jb | Version::Ka | Version::La => FormatGeneration::Legacy,
            _ => FormatGeneration::Modern,
        }
    }

    /// `jb` and `ka` files carry keyspace and table in their file name.
    pub fn uses_legacy_naming(&self) -> bool {
        matches!(self, Version::Jb | Version::Ka)
    }
}

impl FromStr for Version {
    type Err = SSTableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::ALL
            .iter()
            .copied()
            .find(|v| v.tag() == s)
            .ok_or_else(|| SSTableError::UnsupportedVersion(s.to_string()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
