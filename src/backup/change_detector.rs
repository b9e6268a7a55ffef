use crate::backup::found_file::FoundFile;
use crate::backup::result_error::result::Result;

use std::collections::{BTreeMap, HashMap};

/// Tolerance for mtime comparison, covering float round-trips through storage
/// and filesystem timestamp granularity.
pub const MTIME_ALLOW_ERR: f64 = 0.000_000_5;

/// Read access to the last backed-up mtime per source key.
pub trait MetadataLookup {
    fn stored_mtime(&self, key: &str) -> Result<Option<f64>>;
}

impl MetadataLookup for HashMap<String, f64> {
    fn stored_mtime(&self, key: &str) -> Result<Option<f64>> {
        Ok(self.get(key).copied())
    }
}

impl MetadataLookup for BTreeMap<String, f64> {
    fn stored_mtime(&self, key: &str) -> Result<Option<f64>> {
        Ok(self.get(key).copied())
    }
}

/// Whether two mtimes denote the same modification.
pub fn same_mtime(a: f64, b: f64) -> bool {
    !(a <= b - MTIME_ALLOW_ERR || a > b + MTIME_ALLOW_ERR)
}

/// Files whose current mtime has no matching stored record.
pub fn modified<'a, I, L>(files: I, lookup: &L) -> Result<Vec<FoundFile>>
where
    I: IntoIterator<Item = &'a FoundFile>,
    L: MetadataLookup + ?Sized,
{
    let mut result = Vec::new();
    for file in files {
        let needs_backup = match lookup.stored_mtime(file.key())? {
            None => true,
            Some(stored) => !same_mtime(stored, file.mtime()),
        };
        if needs_backup {
            tracing::debug!("MODIFIED: {:?}", file.path());
            result.push(file.clone());
        }
    }
    Ok(result)
}
