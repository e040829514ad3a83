//! User-facing progress output
//!
//! Verbose mode prints a line per file event, normal mode a single
//! character, quiet mode nothing but warnings.

use deltaput_types::Verbosity;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEvent {
    /// Transport call succeeded
    Uploaded,
    /// Dry run, nothing was sent
    WouldUpload,
    /// Recoverable failure, will be retried
    Retry,
    /// Terminal failure
    Rejected,
}

impl FileEvent {
    /// Progress character used in normal mode
    pub fn progress_char(self) -> &'static str {
        match self {
            Self::Uploaded | Self::WouldUpload => ".",
            Self::Retry => "r",
            Self::Rejected => "F",
        }
    }
}

type Sink = Box<dyn Write + Send>;

/// Shared writer for per-file and summary messages
#[derive(Clone)]
pub struct Reporter {
    verbosity: Verbosity,
    out: Arc<Mutex<Sink>>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    /// Reporter writing to stdout
    pub fn stdout(verbosity: Verbosity) -> Self {
        Self::with_writer(verbosity, std::io::stdout())
    }

    /// Reporter writing to any sink
    pub fn with_writer<W: Write + Send + 'static>(verbosity: Verbosity, writer: W) -> Self {
        Self {
            verbosity,
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Reporter that discards everything
    pub fn silent() -> Self {
        Self::with_writer(Verbosity::Quiet, std::io::sink())
    }

    /// Current verbosity
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Print `verbose` as a line in verbose mode, `normal` as-is in normal
    /// mode, nothing when quiet
    pub fn say(&self, verbose: &str, normal: &str) {
        match self.verbosity {
            Verbosity::Verbose => self.write(&format!("{}\n", verbose)),
            Verbosity::Normal => self.write(normal),
            Verbosity::Quiet => {}
        }
    }

    /// Phase message: a line in verbose and normal mode
    pub fn phase(&self, message: &str) {
        if self.verbosity != Verbosity::Quiet {
            self.write(&format!("{}\n", message));
        }
    }

    /// Always printed
    pub fn warn(&self, message: &str) {
        self.write(&format!("{}\n", message));
    }

    /// Report one file event
    pub fn file_event(&self, name: &str, event: FileEvent, detail: Option<&str>) {
        let line = match (event, detail) {
            (FileEvent::Uploaded, _) => format!("Uploaded {}", name),
            (FileEvent::WouldUpload, _) => format!("Would upload {}", name),
            (FileEvent::Retry, Some(detail)) => format!("Retrying {}: {}", name, detail),
            (FileEvent::Retry, None) => format!("Retrying {}", name),
            (FileEvent::Rejected, Some(detail)) => format!("Failed {}: {}", name, detail),
            (FileEvent::Rejected, None) => format!("Failed {}", name),
        };
        self.say(&line, event.progress_char());
    }

    /// End the row of progress characters
    pub fn finish_line(&self) {
        if self.verbosity == Verbosity::Normal {
            self.write("\n");
        }
    }

    fn write(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // output is best effort, a closed stdout must not fail the run
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}
