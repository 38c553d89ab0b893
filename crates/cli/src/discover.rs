use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Every file under `root` whose name ends in `Data.db`, sorted.
///
/// Staging files (`*.tmp`) and anything under a `snapshots` or `backups`
/// directory are ignored.
pub fn data_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(root, &mut found)?;
    found.sort();
    debug!(root = %root.display(), files = found.len(), "discovered data files");
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("cannot list {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("cannot list {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let skip = matches!(path.file_name().and_then(|n| n.to_str()), Some("snapshots" | "backups"));
            if !skip {
                walk(&path, found)?;
            }
        } else if path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with("Data.db")) {
            found.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finds_data_files_recursively() -> Result<()> {
        let dir = tempdir()?;
        let t1 = dir.path().join("ks/t1");
        let t2 = dir.path().join("ks/t2");
        fs::create_dir_all(&t1)?;
        fs::create_dir_all(&t2)?;
        fs::write(t1.join("mc-2-big-Data.db"), b"")?;
        fs::write(t1.join("mc-1-big-Data.db"), b"")?;
        fs::write(t1.join("mc-1-big-Index.db"), b"")?;
        fs::write(t2.join("ks-t2-ka-1-Data.db"), b"")?;

        let files = data_files(dir.path())?;
        assert_eq!(
            files,
            vec![
                t1.join("mc-1-big-Data.db"),
                t1.join("mc-2-big-Data.db"),
                t2.join("ks-t2-ka-1-Data.db"),
            ]
        );
        Ok(())
    }

    #[test]
    fn skips_staging_and_snapshots() -> Result<()> {
        let dir = tempdir()?;
        let snap = dir.path().join("ks/t/snapshots/s1");
        fs::create_dir_all(&snap)?;
        fs::write(snap.join("mc-1-big-Data.db"), b"")?;
        fs::write(dir.path().join("ks/t/mc-3-big-Data.db.tmp"), b"")?;
        assert!(data_files(dir.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_root_is_an_error() {
        assert!(data_files(Path::new("/nonexistent/keyspace")).is_err());
    }
}
