//! `Filter.db`: bloom filter over the partition keys of one SSTable.

use bloomfilter::Bloom;
use std::fs;
use std::path::Path;

use crate::error::{Result, SSTableError};

pub struct PartitionFilter {
    bloom: Bloom<[u8]>,
}

impl PartitionFilter {
    /// Sizes the filter for `expected_keys` keys (at least one) at the given
    /// false-positive rate.
    pub fn new(expected_keys: u64, fp_chance: f64) -> Result<Self> {
        if !(fp_chance > 0.0 && fp_chance < 1.0) {
            return Err(SSTableError::Filter(format!("false-positive chance {} outside (0, 1)", fp_chance)));
        }
        let items = expected_keys.clamp(1, usize::MAX as u64) as usize;
        let bloom = Bloom::new_for_fp_rate(items, fp_chance).map_err(|e| SSTableError::Filter(e.to_string()))?;
        Ok(Self { bloom })
    }

    pub fn insert(&mut self, key: &[u8]) {
        self.bloom.set(key);
    }

    /// `false` means the key is definitely absent.
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.bloom.check(key)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bloom.as_slice().to_vec()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| SSTableError::io(path, e))?;
        let bloom = Bloom::from_slice(&bytes)
            .map_err(|e| SSTableError::corrupt(path, 0, format!("unreadable filter: {}", e)))?;
        Ok(Self { bloom })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn inserted_keys_are_found_after_reload() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mc-1-big-Filter.db");

        let mut f = PartitionFilter::new(100, 0.01)?;
        for i in 0..100u32 {
            f.insert(&i.to_be_bytes());
        }
        fs::write(&path, f.to_bytes())?;

        let loaded = PartitionFilter::load(&path)?;
        for i in 0..100u32 {
            assert!(loaded.might_contain(&i.to_be_bytes()));
        }
        Ok(())
    }

    #[test]
    fn zero_expected_keys_still_builds() -> Result<()> {
        let mut f = PartitionFilter::new(0, 0.01)?;
        f.insert(b"k");
        assert!(f.might_contain(b"k"));
        Ok(())
    }

    #[test]
    fn invalid_rate_is_an_error() {
        assert!(PartitionFilter::new(10, 0.0).is_err());
        assert!(PartitionFilter::new(10, 1.5).is_err());
    }
}
