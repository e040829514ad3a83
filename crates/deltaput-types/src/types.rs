//! Core data types for deltaput

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unique identifier for an upload run
pub type RunId = uuid::Uuid;

/// Transfer rate in bytes per second
pub type TransferRate = f64;

/// How chatty the per-file output is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Verbosity {
    /// Only warnings and fatal errors
    Quiet,
    /// One progress character per file event
    #[default]
    Normal,
    /// One line per file event
    Verbose,
}

impl Verbosity {
    /// Resolve the verbosity from the two command-line toggles.
    ///
    /// Verbose wins when both are set.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }
}

/// Upload statistics for a single run
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UploadStats {
    /// Number of files that reached the completed state
    pub files_uploaded: u64,
    /// Number of files that were rejected
    pub files_rejected: u64,
    /// Number of re-enqueues caused by recoverable failures
    pub retries: u64,
    /// Number of files that were only pretended to be uploaded
    pub files_skipped: u64,
    /// Total body bytes handed to the transport for completed files
    pub bytes_uploaded: u64,
    /// Total duration of the upload phase
    pub duration: Duration,
}

impl UploadStats {
    /// Create a new empty statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate the overall transfer rate
    pub fn transfer_rate(&self) -> TransferRate {
        if self.duration.as_secs_f64() > 0.0 {
            self.bytes_uploaded as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Number of files that reached a terminal state
    pub fn files_processed(&self) -> u64 {
        self.files_uploaded + self.files_rejected + self.files_skipped
    }
}
