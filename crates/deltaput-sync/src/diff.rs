//! Snapshot difference detection
//!
//! Synchronization is additive: a path that exists only in the cached
//! snapshot is not a change.

use crate::snapshot::Snapshot;
use tracing::info;

/// Type of change detected for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// No cached hash for the path
    Added,
    /// Cached hash differs from the current one
    Modified,
}

/// A path that needs uploading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Path relative to the source root
    pub path: String,
    /// Type of change
    pub change_type: ChangeType,
}

/// Ordered set of changed paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSet {
    changes: Vec<FileChange>,
}

impl DiffSet {
    /// Number of changed paths
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Nothing to upload
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Changed paths in lexicographic order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.path.as_str())
    }

    /// Whether `path` is part of this diff
    pub fn contains(&self, path: &str) -> bool {
        self.changes
            .binary_search_by(|c| c.path.as_str().cmp(path))
            .is_ok()
    }

    /// Iterate the changes in path order
    pub fn iter(&self) -> std::slice::Iter<'_, FileChange> {
        self.changes.iter()
    }
}

impl<'a> IntoIterator for &'a DiffSet {
    type Item = &'a FileChange;
    type IntoIter = std::slice::Iter<'a, FileChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Engine for comparing the current snapshot with the cached one
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

impl DiffEngine {
    /// Create a new diff engine
    pub fn new() -> Self {
        Self
    }

    /// Every path of `current` whose hash is missing from, or different
    /// in, `cached`. The result is sorted by path.
    pub fn diff(&self, current: &Snapshot, cached: &Snapshot) -> DiffSet {
        // Snapshot iterates in key order, so no extra sort is needed
        let changes: Vec<FileChange> = current
            .iter()
            .filter_map(|(path, hash)| {
                let change_type = match cached.get(path) {
                    None => ChangeType::Added,
                    Some(old) if old != hash => ChangeType::Modified,
                    Some(_) => return None,
                };
                Some(FileChange {
                    path: path.to_string(),
                    change_type,
                })
            })
            .collect();

        info!(
            "Detected {} changes ({} cached, {} current)",
            changes.len(),
            cached.len(),
            current.len()
        );
        DiffSet { changes }
    }
}
