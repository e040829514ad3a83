//! Content-hash snapshots of a source tree
//!
//! A [`Snapshot`] maps every regular file under a root, keyed by its
//! `/`-separated path relative to that root, to the hex digest of its
//! content. The on-disk form is one `<hash>  <path>` entry per line;
//! backslashes and line breaks in paths are written as `\\`, `\n` and `\r`.

use deltaput_types::{Error, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Separator between the digest and the path in the cache file
const FIELD_SEPARATOR: &str = "  ";

/// Path to content-hash mapping for one state of a file tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<String, String>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash every regular file under `root`.
    ///
    /// Symlinks are not followed. The walk and the hashing run on the
    /// blocking pool since they read every byte of the tree.
    pub async fn build<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let root_name = root.display().to_string();

        let snapshot = tokio::task::spawn_blocking(move || Self::build_blocking(&root))
            .await
            .map_err(|e| Error::other(format!("Hashing task failed: {}", e)))??;

        info!("Hashed {} files under '{}'", snapshot.len(), root_name);
        Ok(snapshot)
    }

    fn build_blocking(root: &Path) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| Error::Io {
                message: format!("Failed to walk '{}': {}", root.display(), e),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let content = std::fs::read(entry.path()).map_err(|e| {
                Error::file_read(entry.path(), format!("Failed to read for hashing: {}", e))
            })?;
            let hash = blake3::hash(&content).to_hex().to_string();

            let key = relative_key(root, entry.path());
            debug!("{}  {}", hash, key);
            entries.insert(key, hash);
        }

        Ok(Self { entries })
    }

    /// Read a previously dumped snapshot; a missing file yields an empty one
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache at '{}', starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => {
                return Err(Error::cache(path, format!("Failed to read cache: {}", e)));
            }
        };

        let snapshot = Self::parse(&content).map_err(|message| Error::cache(path, message))?;
        info!("Loaded {} cached hashes from '{}'", snapshot.len(), path.display());
        Ok(snapshot)
    }

    /// Write the snapshot to `path`, replacing it atomically
    pub async fn dump<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = temp_path_for(path);

        fs::write(&tmp_path, self.render())
            .await
            .map_err(|e| Error::cache(path, format!("Failed to write cache: {}", e)))?;

        if let Err(e) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::cache(path, format!("Failed to replace cache: {}", e)));
        }

        info!("Saved {} hashes to '{}'", self.len(), path.display());
        Ok(())
    }

    fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut entries = BTreeMap::new();

        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (hash, key) = line
                .split_once(FIELD_SEPARATOR)
                .filter(|(hash, key)| !hash.is_empty() && !key.is_empty())
                .and_then(|(hash, key)| Some((hash, unescape_key(key)?)))
                .ok_or_else(|| format!("Malformed entry on line {}", number + 1))?;
            entries.insert(key, hash.to_string());
        }

        Ok(Self { entries })
    }

    fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(key, hash)| format!("{}{}{}\n", hash, FIELD_SEPARATOR, escape_key(key)))
            .collect()
    }

    /// Insert or replace the hash recorded for `path`
    pub fn insert(&mut self, path: impl Into<String>, hash: impl Into<String>) {
        self.entries.insert(path.into(), hash.into());
    }

    /// Hash recorded for `path`
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// Whether `path` has an entry
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(path, hash)` pairs in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Keep only the entries for which `keep` returns true
    pub fn retain<F: FnMut(&str) -> bool>(&mut self, mut keep: F) {
        self.entries.retain(|key, _| keep(key));
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// `/`-separated path of `path` relative to `root`
fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Keep an entry on one line whatever bytes its path contains
fn escape_key(key: &str) -> Cow<'_, str> {
    if !key.contains(['\\', '\n', '\r']) {
        return Cow::Borrowed(key);
    }
    let mut escaped = String::with_capacity(key.len() + 2);
    for c in key.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Inverse of [`escape_key`]; `None` on a dangling or unknown escape
fn unescape_key(raw: &str) -> Option<String> {
    let mut key = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            key.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => key.push('\\'),
            'n' => key.push('\n'),
            'r' => key.push('\r'),
            _ => return None,
        }
    }
    Some(key)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
