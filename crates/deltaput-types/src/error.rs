//! Error types and handling for deltaput
//!
//! Every failure in the upload pipeline is expressed as an [`Error`]. Errors
//! carry an [`ErrorKind`] for coarse classification, which the binary maps
//! to its exit code. Per-file transport failures are further split into
//! recoverable and permanent ones through [`Error::is_recoverable`].

use std::path::PathBuf;

/// Transport error signatures that are worth retrying.
///
/// Matching is done on the *end* of the rendered error message.
pub const RECOVERABLE_ERROR_SUFFIXES: &[&str] = &[
    "Idle connections will be closed.",
    "EOF",
    "broken pipe",
    "no such host",
    "transport closed before response was received",
    "TLS handshake timeout",
];

/// Main error type for deltaput operations
#[derive(thiserror::Error, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// A source file could not be read
    #[error("Read error for {path}: {message}")]
    FileRead {
        /// Path of the unreadable file
        path: PathBuf,
        /// Underlying error message
        message: String,
    },

    /// The object store rejected or failed a request
    #[error("Transport error: {message}")]
    Transport {
        /// Error message from the transport
        message: String,
    },

    /// A single transport call exceeded its deadline
    #[error("Operation timed out after {millis} ms")]
    Timeout {
        /// Deadline that was exceeded, in milliseconds
        millis: u64,
    },

    /// Credentials are missing or unusable
    #[error("Authentication error: {message}")]
    Auth {
        /// Error message describing the credential issue
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// The hash cache could not be loaded or persisted
    #[error("Cache error for {path}: {message}")]
    Cache {
        /// Cache file path
        path: PathBuf,
        /// Underlying error message
        message: String,
    },

    /// The upload scheduler lost its workers
    #[error("Scheduler error: {message}")]
    Scheduler {
        /// Error message describing the failure
        message: String,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O related errors, including unreadable source files
    Io,
    /// Transport errors, including timeouts
    Transport,
    /// Credential errors
    Auth,
    /// Configuration errors
    Config,
    /// Cache persistence errors
    Cache,
    /// Scheduler failures
    Scheduler,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::FileRead { .. } => ErrorKind::Io,
            Self::Transport { .. } | Self::Timeout { .. } => ErrorKind::Transport,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Config { .. } => ErrorKind::Config,
            Self::Cache { .. } => ErrorKind::Cache,
            Self::Scheduler { .. } => ErrorKind::Scheduler,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Check if this error is worth another attempt.
    ///
    /// Only transport errors whose message ends with one of
    /// [`RECOVERABLE_ERROR_SUFFIXES`] and per-call timeouts qualify.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport { message } => is_recoverable_message(message),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new authentication error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new file read error
    pub fn file_read<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::FileRead {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Cache {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new scheduler error
    pub fn scheduler<S: Into<String>>(message: S) -> Self {
        Self::Scheduler {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Check a rendered error message against the recoverable allow-list
pub fn is_recoverable_message(message: &str) -> bool {
    RECOVERABLE_ERROR_SUFFIXES
        .iter()
        .any(|suffix| message.ends_with(suffix))
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
