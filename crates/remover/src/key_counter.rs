use sstable::{Component, Descriptor, KeyIterator};

use crate::error::{Result, RewriteError};

/// Counts the partitions of a table by walking `Index.db` alone.
///
/// The whole index is read, so its footer count and checksum are verified
/// along the way.
pub fn count_keys(descriptor: &Descriptor) -> Result<u64> {
    let path = descriptor.path_for(Component::Index);
    let keys = KeyIterator::open(&path).map_err(|e| RewriteError::from_source(&path, e))?;
    let mut count = 0u64;
    for entry in keys {
        entry.map_err(|e| RewriteError::from_source(&path, e))?;
        count += 1;
    }
    Ok(count)
}
