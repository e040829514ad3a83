//! Persisting the hash cache at the end of a run

use crate::diff::DiffSet;
use crate::snapshot::Snapshot;
use deltaput_types::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes the snapshot the next run will diff against
#[derive(Debug, Clone)]
pub struct CacheWriter {
    cache_file: PathBuf,
    enabled: bool,
}

impl CacheWriter {
    /// Create a writer for `cache_file`; a disabled writer never touches disk
    pub fn new<P: Into<PathBuf>>(cache_file: P, enabled: bool) -> Self {
        Self {
            cache_file: cache_file.into(),
            enabled,
        }
    }

    /// Cache file location
    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// Whether [`persist`](Self::persist) will write anything
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Restrict `current` to the completed uploads plus every path that was
    /// not part of `diff`.
    ///
    /// Rejected files drop out so the next run sees them as changed again.
    pub fn finalize<'a, I>(current: &Snapshot, diff: &DiffSet, completed: I) -> Snapshot
    where
        I: IntoIterator<Item = &'a str>,
    {
        let completed: HashSet<&str> = completed.into_iter().collect();
        let mut next = current.clone();
        next.retain(|path| !diff.contains(path) || completed.contains(path));
        next
    }

    /// Dump `snapshot` if caching is enabled. Returns whether it was written.
    pub async fn persist(&self, snapshot: &Snapshot) -> Result<bool> {
        if !self.enabled {
            info!("Skipping cache");
            return Ok(false);
        }

        snapshot.dump(&self.cache_file).await?;
        Ok(true)
    }
}
