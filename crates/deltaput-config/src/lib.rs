//! Configuration management for deltaput
//!
//! Options come in two flavours:
//!
//! - [`Config`] holds everything that may be persisted and reused between
//!   runs: bucket, source root, cache file, region, worker count, header
//!   rules and so on. It is layered from defaults, an optional config file
//!   (JSON, YAML or TOML) and `DELTAPUT_*` environment variables, then
//!   command-line overrides are merged on top.
//! - [`RunFlags`] are per-invocation toggles (dry run, verbosity, upload and
//!   cache switches) that are never written to disk.
//!
//! # Examples
//!
//! ```rust
//! use deltaput_config::{ConfigBuilder, ConfigOverrides};
//!
//! let mut config = ConfigBuilder::new()
//!     .add_defaults()
//!     .build()
//!     .expect("defaults are valid");
//!
//! config.merge(ConfigOverrides {
//!     bucket: Some("static.example.com".to_string()),
//!     ..ConfigOverrides::default()
//! });
//! assert_eq!(config.bucket, "static.example.com");
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use deltaput_types::{RetryConfig, Verbosity, WorkerCount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod builder;
pub mod credentials;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use credentials::{load_profile, shared_credentials_path, ProfileCredentials};
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Cache-Control header name
pub const CACHE_CONTROL: &str = "Cache-Control";
/// Content-Encoding header name
pub const CONTENT_ENCODING: &str = "Content-Encoding";

/// Regions accepted when no explicit endpoint is configured
pub const KNOWN_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "sa-east-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "eu-north-1",
    "eu-south-1",
    "ap-south-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-east-1",
    "me-south-1",
    "af-south-1",
    "cn-north-1",
    "us-gov-west-1",
];

/// Persisted options for an upload run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of concurrent upload workers
    pub workers: WorkerCount,
    /// Target bucket name
    pub bucket: String,
    /// Local directory whose files are uploaded
    pub source: PathBuf,
    /// Location of the hash cache file
    pub cache_file: PathBuf,
    /// Target region
    pub region: String,
    /// Credentials profile name
    pub profile: Option<String>,
    /// Explicit object store URL; `file://` targets a local directory
    pub endpoint: Option<String>,
    /// Request server-side encryption for every object
    pub encrypt: bool,
    /// Gzip files whose header rule asks for it
    pub gzip: bool,
    /// Optional deadline for a single transport call, in seconds
    pub transfer_timeout_secs: Option<u64>,
    /// Retry policy for recoverable transport failures
    pub retry: RetrySettings,
    /// Ordered pattern to header rules, first match wins
    pub header_rules: Vec<HeaderRuleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: WorkerCount::default(),
            bucket: String::new(),
            source: PathBuf::from("output"),
            cache_file: PathBuf::from(".deltaput.txt"),
            region: "us-east-1".to_string(),
            profile: None,
            endpoint: None,
            encrypt: false,
            gzip: true,
            transfer_timeout_secs: None,
            retry: RetrySettings::default(),
            header_rules: default_header_rules(),
        }
    }
}

impl Config {
    /// Merge command-line overrides into this configuration.
    ///
    /// Only values that are actually set override; `encrypt` can be turned
    /// on but never off by an override.
    pub fn merge(&mut self, other: ConfigOverrides) {
        if let Some(workers) = other.workers {
            self.workers = workers;
        }
        if let Some(bucket) = other.bucket.filter(|b| !b.is_empty()) {
            self.bucket = bucket;
        }
        if let Some(source) = other.source {
            self.source = source;
        }
        if let Some(cache_file) = other.cache_file {
            self.cache_file = cache_file;
        }
        if let Some(region) = other.region.filter(|r| !r.is_empty()) {
            self.region = region;
        }
        if let Some(profile) = other.profile.filter(|p| !p.is_empty()) {
            self.profile = Some(profile);
        }
        if let Some(endpoint) = other.endpoint.filter(|e| !e.is_empty()) {
            self.endpoint = Some(endpoint);
        }
        if other.encrypt {
            self.encrypt = true;
        }
        if let Some(gzip) = other.gzip {
            self.gzip = gzip;
        }
        if let Some(timeout) = other.transfer_timeout_secs {
            self.transfer_timeout_secs = Some(timeout);
        }
    }

    /// Per-call transport deadline, if any
    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Check everything a run needs before touching the network
    pub fn validate_for_run(&self) -> ConfigResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::missing_required("Bucket Name"));
        }

        if !self.source.is_dir() {
            return Err(ConfigError::invalid_value(
                "Source",
                format!("'{}' is not a directory", self.source.display()),
            ));
        }

        let cache_dir = self
            .cache_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if !cache_dir.is_dir() {
            return Err(ConfigError::invalid_value(
                "Cache file",
                format!("directory '{}' does not exist", cache_dir.display()),
            ));
        }

        if self.endpoint.is_none() && !KNOWN_REGIONS.contains(&self.region.as_str()) {
            return Err(ConfigError::invalid_value(
                "Region",
                format!(
                    "unknown region '{}'. Valid regions: {}",
                    self.region,
                    KNOWN_REGIONS.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

/// Values coming from the command line, merged over the layered config
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Number of workers
    pub workers: Option<WorkerCount>,
    /// Bucket name
    pub bucket: Option<String>,
    /// Source directory
    pub source: Option<PathBuf>,
    /// Cache file
    pub cache_file: Option<PathBuf>,
    /// Region
    pub region: Option<String>,
    /// Credentials profile
    pub profile: Option<String>,
    /// Endpoint override
    pub endpoint: Option<String>,
    /// Enable server-side encryption
    pub encrypt: bool,
    /// Gzip toggle
    pub gzip: Option<bool>,
    /// Transfer timeout in seconds
    pub transfer_timeout_secs: Option<u64>,
}

/// Retry settings as they appear in config files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum attempts per file
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_attempts: retry.max_attempts,
            base_delay_ms: retry.initial_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    /// Convert into the validated retry policy used by the scheduler
    pub fn to_retry_config(&self) -> ConfigResult<RetryConfig> {
        RetryConfig::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            2.0,
        )
        .map_err(|message| ConfigError::invalid_value("retry", message))
    }
}

/// One pattern to header-set rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRuleConfig {
    /// Regular expression matched against the relative file path
    pub pattern: String,
    /// Headers applied when the pattern matches
    pub headers: BTreeMap<String, String>,
}

impl HeaderRuleConfig {
    /// Create a rule from a pattern and `(name, value)` pairs
    pub fn new(pattern: impl Into<String>, headers: &[(&str, &str)]) -> Self {
        Self {
            pattern: pattern.into(),
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }
}

/// Built-in header rules for a static web site
pub fn default_header_rules() -> Vec<HeaderRuleConfig> {
    const YEAR: &str = "max-age=31536000";
    vec![
        HeaderRuleConfig::new(
            r"index\.html",
            &[(CONTENT_ENCODING, "gzip"), (CACHE_CONTROL, "max-age=1800")],
        ),
        HeaderRuleConfig::new(
            r"articole.*\.html$",
            &[(CONTENT_ENCODING, "gzip"), (CACHE_CONTROL, "max-age=86400")],
        ),
        HeaderRuleConfig::new(
            r"[^/]*\.html$",
            &[(CONTENT_ENCODING, "gzip"), (CACHE_CONTROL, "max-age=3600")],
        ),
        HeaderRuleConfig::new(
            r"\.xml$",
            &[(CONTENT_ENCODING, "gzip"), (CACHE_CONTROL, "max-age=1800")],
        ),
        HeaderRuleConfig::new(r"\.ico$", &[(CONTENT_ENCODING, "gzip"), (CACHE_CONTROL, YEAR)]),
        HeaderRuleConfig::new(
            r"\.(js|css)$",
            &[(CONTENT_ENCODING, "gzip"), (CACHE_CONTROL, YEAR)],
        ),
        HeaderRuleConfig::new(r"images/articole/.*(jpg|JPG|png|PNG)$", &[(CACHE_CONTROL, YEAR)]),
        HeaderRuleConfig::new(r"\.(jpg|JPG|png|PNG)$", &[(CACHE_CONTROL, YEAR)]),
    ]
}

/// Per-invocation toggles, never persisted
#[derive(Debug, Clone)]
pub struct RunFlags {
    /// Walk through the motions without uploading or touching the cache
    pub dry_run: bool,
    /// One line per file event
    pub verbose: bool,
    /// Only warnings and errors
    pub quiet: bool,
    /// Perform the upload phase
    pub do_upload: bool,
    /// Perform the cache phase
    pub do_cache: bool,
    /// Persist the effective config before running
    pub save_config: bool,
    /// Config file to load and, with `save_config`, write back
    pub config_file: Option<PathBuf>,
}

impl Default for RunFlags {
    fn default() -> Self {
        Self {
            dry_run: false,
            verbose: false,
            quiet: false,
            do_upload: true,
            do_cache: true,
            save_config: false,
            config_file: None,
        }
    }
}

impl RunFlags {
    /// Output verbosity derived from the verbose and quiet toggles
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }

    /// Whether the cache file should be rewritten at the end of the run
    pub fn writes_cache(&self) -> bool {
        self.do_cache && !self.dry_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runnable_config(temp_dir: &TempDir) -> Config {
        let source = temp_dir.path().join("site");
        std::fs::create_dir_all(&source).unwrap();
        Config {
            bucket: "static.example.com".to_string(),
            source,
            cache_file: temp_dir.path().join(".deltaput.txt"),
            ..Config::default()
        }
    }

    #[test]
    fn test_merge_only_overrides_set_values() {
        let mut config = Config {
            bucket: "old".to_string(),
            region: "eu-west-1".to_string(),
            encrypt: true,
            ..Config::default()
        };

        config.merge(ConfigOverrides {
            bucket: Some(String::new()),
            region: Some("us-west-1".to_string()),
            workers: Some(WorkerCount::new(7).unwrap()),
            ..ConfigOverrides::default()
        });

        assert_eq!(config.bucket, "old");
        assert_eq!(config.region, "us-west-1");
        assert_eq!(config.workers.get(), 7);
        // an override can't switch encryption off
        assert!(config.encrypt);
    }

    #[test]
    fn test_validate_for_run() {
        let temp_dir = TempDir::new().unwrap();
        let config = runnable_config(&temp_dir);
        assert!(config.validate_for_run().is_ok());
    }

    #[test]
    fn test_validate_missing_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            bucket: String::new(),
            ..runnable_config(&temp_dir)
        };
        let err = config.validate_for_run().unwrap_err();
        assert!(err.to_string().contains("Bucket Name should be set"));
    }

    #[test]
    fn test_validate_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            source: temp_dir.path().join("nope"),
            ..runnable_config(&temp_dir)
        };
        assert!(config.validate_for_run().is_err());
    }

    #[test]
    fn test_validate_region() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            region: "mars-north-1".to_string(),
            ..runnable_config(&temp_dir)
        };
        assert!(config.validate_for_run().is_err());

        let config = Config {
            endpoint: Some("http://localhost:9000".to_string()),
            ..config
        };
        assert!(config.validate_for_run().is_ok());
    }

    #[test]
    fn test_run_flags() {
        let flags = RunFlags::default();
        assert!(flags.writes_cache());
        assert_eq!(flags.verbosity(), Verbosity::Normal);

        let dry = RunFlags {
            dry_run: true,
            ..RunFlags::default()
        };
        assert!(!dry.writes_cache());
    }

    #[test]
    fn test_transfer_timeout() {
        let mut config = Config::default();
        assert_eq!(config.transfer_timeout(), None);
        config.transfer_timeout_secs = Some(0);
        assert_eq!(config.transfer_timeout(), None);
        config.transfer_timeout_secs = Some(30);
        assert_eq!(config.transfer_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_default_rules_order() {
        let rules = default_header_rules();
        assert_eq!(rules.len(), 8);
        assert_eq!(rules[0].pattern, r"index\.html");
        assert_eq!(rules[2].headers[CACHE_CONTROL], "max-age=3600");
    }
}
