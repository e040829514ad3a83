//! Shared fixtures for deltaput integration tests

use async_trait::async_trait;
use deltaput_config::{Config, RetrySettings, RunFlags};
use deltaput_engine::{Reporter, SourceFile, Transport, UploadEngine};
use deltaput_types::{Error, Result, WorkerCount};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Error message that matches the recoverable allow-list
pub const RECOVERABLE_MESSAGE: &str = "read tcp 192.0.2.1:443: EOF";
/// Error message that doesn't
pub const FATAL_MESSAGE: &str = "NoSuchBucket: The specified bucket does not exist";

/// A source tree, a cache file location and a local store in one temp dir
pub struct SiteFixture {
    _temp: TempDir,
    /// Directory that gets uploaded
    pub source: PathBuf,
    /// Directory store target
    pub store: PathBuf,
    /// Hash cache file
    pub cache_file: PathBuf,
}

impl SiteFixture {
    /// Create an empty site
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let source = temp.path().join("output");
        fs::create_dir_all(&source).expect("Failed to create source dir");
        Self {
            store: temp.path().join("store"),
            cache_file: temp.path().join(".deltaput.txt"),
            source,
            _temp: temp,
        }
    }

    /// Write `content` to `relative`, creating parent directories
    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) -> &Self {
        let path = self.source.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(path, content).expect("Failed to write test file");
        self
    }

    /// Delete `relative` from the source tree
    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.source.join(relative)).expect("Failed to remove test file");
    }

    /// Config pointing at this fixture, with millisecond backoff
    pub fn config(&self) -> Config {
        Config {
            bucket: "site".to_string(),
            source: self.source.clone(),
            cache_file: self.cache_file.clone(),
            workers: WorkerCount::new(4).expect("valid worker count"),
            retry: fast_retry(),
            ..Config::default()
        }
    }

    /// Contents of the cache file, if it exists
    pub fn cache_contents(&self) -> Option<String> {
        fs::read_to_string(&self.cache_file).ok()
    }
}

impl Default for SiteFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry policy with the default ceiling and near-zero delays
pub fn fast_retry() -> RetrySettings {
    RetrySettings {
        max_attempts: 10,
        base_delay_ms: 1,
        max_delay_ms: 4,
    }
}

/// Build an engine that reports nothing
pub fn quiet_engine(config: Config, flags: RunFlags, transport: Arc<dyn Transport>) -> UploadEngine {
    UploadEngine::new(config, flags, transport, Reporter::silent())
        .expect("Failed to create engine")
}

/// How a [`ScriptedTransport`] answers a put
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Always accept
    Succeed,
    /// Always fail with a recoverable error
    Recoverable,
    /// Always fail with a non-recoverable error
    Fatal,
    /// Fail recoverably this many times, then accept
    FailTimes(usize),
    /// Panic inside the transport call
    Panic,
}

/// In-memory transport with per-file behavior that records every call
pub struct ScriptedTransport {
    default: Behavior,
    overrides: HashMap<String, Behavior>,
    calls: Mutex<HashMap<String, usize>>,
    stored: Mutex<HashMap<String, StoredObject>>,
}

/// What the transport received for one key
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Body as sent
    pub body: Vec<u8>,
    /// Headers as resolved
    pub headers: Vec<(String, String)>,
}

impl StoredObject {
    /// Value of header `name`
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl ScriptedTransport {
    /// Transport answering every put with `default`
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            stored: Mutex::new(HashMap::new()),
        }
    }

    /// Answer puts for `path` with `behavior` instead
    pub fn with(mut self, path: &str, behavior: Behavior) -> Self {
        self.overrides.insert(path.to_string(), behavior);
        self
    }

    /// Number of puts seen for `path`
    pub fn calls(&self, path: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Number of puts seen overall
    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("calls lock").values().sum()
    }

    /// Object stored under `path`, if any put succeeded
    pub fn stored(&self, path: &str) -> Option<StoredObject> {
        self.stored.lock().expect("stored lock").get(path).cloned()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn put(&self, file: &SourceFile, body: Vec<u8>) -> Result<()> {
        let seen = {
            let mut calls = self.calls.lock().expect("calls lock");
            let count = calls.entry(file.name().to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let behavior = self
            .overrides
            .get(file.name())
            .copied()
            .unwrap_or(self.default);
        let outcome = match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Recoverable => Err(Error::transport(RECOVERABLE_MESSAGE)),
            Behavior::Fatal => Err(Error::transport(FATAL_MESSAGE)),
            Behavior::FailTimes(n) if seen <= n => Err(Error::transport(RECOVERABLE_MESSAGE)),
            Behavior::FailTimes(_) => Ok(()),
            Behavior::Panic => panic!("transport panicked on {}", file.name()),
        };

        if outcome.is_ok() {
            let headers = file
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.stored
                .lock()
                .expect("stored lock")
                .insert(file.name().to_string(), StoredObject { body, headers });
        }
        outcome
    }
}

/// Relative paths of every regular file under `root`, sorted
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    collect_files(root, root, &mut files);
    files.sort();
    files
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, files);
        } else if let Ok(relative) = path.strip_prefix(root) {
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}
