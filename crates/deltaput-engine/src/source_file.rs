//! The unit of upload work

use crate::headers::{HeaderResolver, HeaderSet};
use deltaput_types::{Error, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// One file of the diff, with everything needed to send it
#[derive(Debug)]
pub struct SourceFile {
    name: String,
    path: PathBuf,
    headers: HeaderSet,
    gzip: bool,
    max_attempts: u32,
    attempts: Mutex<u32>,
}

impl SourceFile {
    /// Build the work item for `name`, relative to `root`
    pub fn new(root: &Path, name: &str, resolver: &HeaderResolver, max_attempts: u32) -> Self {
        let headers = resolver.resolve(name);
        let gzip = headers.is_gzip();
        Self {
            name: name.to_string(),
            path: root.join(name),
            headers,
            gzip,
            max_attempts,
            attempts: Mutex::new(0),
        }
    }

    /// Path relative to the source root, also the object key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolved headers
    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    /// Whether the body is gzipped before sending
    pub fn is_gzip(&self) -> bool {
        self.gzip
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        *self.lock_attempts()
    }

    /// Count one more attempt and return the new total
    pub fn record_attempt(&self) -> u32 {
        let mut attempts = self.lock_attempts();
        *attempts += 1;
        *attempts
    }

    /// Whether another attempt is allowed
    pub fn retriable(&self) -> bool {
        *self.lock_attempts() < self.max_attempts
    }

    /// Exhaust the retry budget; used when the file can't be read at all
    pub fn mark_unreadable(&self) {
        *self.lock_attempts() = self.max_attempts;
    }

    /// Read the file, gzipping it if required.
    ///
    /// A read failure is permanent: the attempt counter is forced to the
    /// ceiling before the error is returned.
    pub async fn body(&self) -> Result<Vec<u8>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                self.mark_unreadable();
                return Err(Error::file_read(&self.path, e.to_string()));
            }
        };

        if !self.gzip {
            return Ok(raw);
        }

        let name = self.name.clone();
        let original_len = raw.len();
        let compressed = tokio::task::spawn_blocking(move || gzip(&raw))
            .await
            .map_err(|e| Error::other(format!("Gzip task for '{}' failed: {}", name, e)))?
            .map_err(|e| Error::Io {
                message: format!("Failed to gzip '{}': {}", name, e),
            })?;

        debug!(
            "Gzipped {} from {} to {} bytes",
            self.name,
            original_len,
            compressed.len()
        );
        Ok(compressed)
    }

    fn lock_attempts(&self) -> MutexGuard<'_, u32> {
        // the counter stays meaningful even if a holder panicked
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn gzip(raw: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder.write_all(raw)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn resolver() -> HeaderResolver {
        HeaderResolver::from_config(&deltaput_config::Config::default()).unwrap()
    }

    #[tokio::test]
    async fn test_plain_body() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("logo.png"), b"\x89PNG").unwrap();

        let file = SourceFile::new(temp_dir.path(), "logo.png", &resolver(), 10);
        assert!(!file.is_gzip());
        assert_eq!(file.body().await.unwrap(), b"\x89PNG");
    }

    #[tokio::test]
    async fn test_gzip_body() {
        let temp_dir = TempDir::new().unwrap();
        let html = b"<html><body>hello hello hello</body></html>";
        std::fs::write(temp_dir.path().join("index.html"), html).unwrap();

        let file = SourceFile::new(temp_dir.path(), "index.html", &resolver(), 10);
        assert!(file.is_gzip());

        let body = file.body().await.unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(body.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, html);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_large_gzip_bodies_in_parallel() {
        let temp_dir = TempDir::new().unwrap();
        let html = "<p>deltaput</p>\n".repeat(256 * 1024);
        std::fs::write(temp_dir.path().join("a.html"), &html).unwrap();
        std::fs::write(temp_dir.path().join("b.html"), &html).unwrap();

        let a = SourceFile::new(temp_dir.path(), "a.html", &resolver(), 10);
        let b = SourceFile::new(temp_dir.path(), "b.html", &resolver(), 10);
        let (a_body, b_body) = tokio::join!(a.body(), b.body());

        for body in [a_body.unwrap(), b_body.unwrap()] {
            assert!(body.len() < html.len() / 10);
            let mut decoded = String::new();
            GzDecoder::new(body.as_slice())
                .read_to_string(&mut decoded)
                .unwrap();
            assert_eq!(decoded, html);
        }
    }

    #[test]
    fn test_gzip_empty_input() {
        let compressed = gzip(b"").unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert!(decoded.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_file_exhausts_retries() {
        let temp_dir = TempDir::new().unwrap();
        let file = SourceFile::new(temp_dir.path(), "missing.html", &resolver(), 10);

        assert!(file.retriable());
        let err = file.body().await.unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
        assert!(!file.retriable());
        assert_eq!(file.attempts(), 10);
    }

    #[test]
    fn test_retry_ceiling() {
        let temp_dir = TempDir::new().unwrap();
        let file = SourceFile::new(temp_dir.path(), "a.txt", &resolver(), 3);

        assert_eq!(file.record_attempt(), 1);
        assert_eq!(file.record_attempt(), 2);
        assert!(file.retriable());
        assert_eq!(file.record_attempt(), 3);
        assert!(!file.retriable());
    }

    #[tokio::test]
    async fn test_concurrent_attempts_do_not_race() {
        let temp_dir = TempDir::new().unwrap();
        let file = Arc::new(SourceFile::new(temp_dir.path(), "a.txt", &resolver(), 1000));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let file = Arc::clone(&file);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    file.record_attempt();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(file.attempts(), 400);
    }
}
