//! Configuration builder for layered configuration loading

use crate::{Config, ConfigError, ConfigResult};
use config::{ConfigBuilder as ConfigBuilderInner, Environment, File, FileFormat};
use deltaput_types::WorkerCount;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Configuration builder for loading configuration from multiple sources
///
/// Sources are applied in the order defaults, files, environment; later
/// sources override earlier ones.
#[derive(Debug)]
pub struct ConfigBuilder {
    inner: ConfigBuilderInner<config::builder::DefaultState>,
    sources: Vec<ConfigSource>,
    env_separator: String,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    File { path: PathBuf, format: FileFormat },
    Defaults,
    Environment { prefix: String },
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            sources: Vec::new(),
            env_separator: "__".to_string(),
        }
    }

    /// Add default configuration values
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a configuration file source; a missing file is skipped
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(ConfigSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Set environment variable separator for nested keys (default: "__")
    pub fn env_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.env_separator = separator.into();
        self
    }

    /// Build the configuration
    pub fn build(mut self) -> ConfigResult<Config> {
        let defaults = Config::default();
        let defaults_value = serde_yaml::to_value(&defaults)
            .map_err(|e| ConfigError::other(format!("Failed to serialize defaults: {}", e)))?;
        self.inner = self
            .inner
            .add_source(config::Config::try_from(&defaults_value)?);

        for source in &self.sources {
            match source {
                ConfigSource::File { path, format } => {
                    if path.exists() {
                        self.inner = self
                            .inner
                            .add_source(File::from(path.clone()).format(*format));
                    }
                }
                ConfigSource::Environment { prefix } => {
                    self.inner = self.inner.add_source(
                        Environment::with_prefix(prefix)
                            .prefix_separator("_")
                            .separator(&self.env_separator),
                    );
                }
                ConfigSource::Defaults => {}
            }
        }

        let first_file = self.first_file();
        let layered = self.inner.build()?;
        let result: Config = layered
            .try_deserialize()
            .map_err(|e| ConfigError::Parse {
                path: first_file.unwrap_or_default(),
                message: e.to_string(),
            })?;

        Self::validate(&result)?;

        Ok(result)
    }

    fn first_file(&self) -> Option<PathBuf> {
        self.sources.iter().find_map(|source| match source {
            ConfigSource::File { path, .. } if path.exists() => Some(path.clone()),
            _ => None,
        })
    }

    /// Detect file format from extension
    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("toml") => FileFormat::Toml,
            // deltaput writes JSON unless told otherwise
            _ => FileFormat::Json,
        }
    }

    /// Structural checks that don't depend on the filesystem
    fn validate(config: &Config) -> ConfigResult<()> {
        if WorkerCount::new(config.workers.get()).is_err() {
            return Err(ConfigError::validation(format!(
                "Workers must be between {} and {}",
                WorkerCount::MIN,
                WorkerCount::MAX
            )));
        }

        config.retry.to_retry_config()?;

        for rule in &config.header_rules {
            Regex::new(&rule.pattern).map_err(|e| {
                ConfigError::invalid_value(
                    "header_rules",
                    format!("bad pattern '{}': {}", rule.pattern, e),
                )
            })?;
        }

        Ok(())
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
