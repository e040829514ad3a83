//! Configuration loader utilities

use crate::{Config, ConfigBuilder, ConfigError, ConfigResult};
use std::path::Path;

/// Prefix for environment overrides, e.g. `DELTAPUT_BUCKET`
pub const ENV_PREFIX: &str = "DELTAPUT";

/// Configuration loader with the common loading patterns
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load defaults, then the given file if any, then the environment.
    ///
    /// A config file that doesn't exist yet is not an error: the first run
    /// with `--save-config` is what creates it.
    pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
        let mut builder = ConfigBuilder::new().add_defaults();

        if let Some(path) = path {
            builder = builder.add_source_file(path);
        }

        builder.add_env_prefix(ENV_PREFIX).build()
    }

    /// Load configuration from a file that must exist
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Configuration file not found",
                ),
            });
        }

        ConfigBuilder::new()
            .add_defaults()
            .add_source_file(path)
            .build()
    }

    /// Save configuration to a file, format picked from the extension
    pub fn save_to_file<P: AsRef<Path>>(config: &Config, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        let mut content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => {
                serde_yaml::to_string(config).map_err(|e| ConfigError::Serialization {
                    message: format!("Failed to serialize to YAML: {}", e),
                })?
            }
            Some("toml") => {
                toml::to_string_pretty(config).map_err(|e| ConfigError::Serialization {
                    message: format!("Failed to serialize to TOML: {}", e),
                })?
            }
            _ => serde_json::to_string_pretty(config).map_err(|e| ConfigError::Serialization {
                message: format!("Failed to serialize to JSON: {}", e),
            })?,
        };
        if !content.ends_with('\n') {
            content.push('\n');
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }
}
