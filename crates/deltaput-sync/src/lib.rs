//! Incremental change detection for deltaput
//!
//! This crate decides which files need uploading:
//!
//! - **Snapshots**: content hashes of every file under the source root, and
//!   the line-oriented cache file they persist to
//! - **Diffing**: changed and new paths, sorted for deterministic runs
//! - **Cache writing**: the snapshot the next run compares against, without
//!   the files that failed to upload
//!
//! # Examples
//!
//! ```rust
//! use deltaput_sync::{CacheWriter, DiffEngine, Snapshot};
//!
//! let cached: Snapshot = [("a.html", "h1")].into_iter().collect();
//! let current: Snapshot = [("a.html", "h1"), ("b.png", "h2")].into_iter().collect();
//!
//! let diff = DiffEngine::new().diff(&current, &cached);
//! assert_eq!(diff.paths().collect::<Vec<_>>(), vec!["b.png"]);
//!
//! // nothing completed: b.png stays out of the next cache
//! let next = CacheWriter::finalize(&current, &diff, std::iter::empty());
//! assert!(!next.contains("b.png"));
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod diff;
pub mod snapshot;

pub use cache::CacheWriter;
pub use diff::{ChangeType, DiffEngine, DiffSet, FileChange};
pub use snapshot::Snapshot;
