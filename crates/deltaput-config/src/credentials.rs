//! Shared AWS credentials file lookup
//!
//! Reads the INI file the AWS tooling keeps at `~/.aws/credentials` (or
//! wherever `AWS_SHARED_CREDENTIALS_FILE` points). Section and key names are
//! matched case-insensitively.

use crate::error::{ConfigError, ConfigResult};
use config::{File, FileFormat, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the credentials file location
pub const SHARED_CREDENTIALS_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";

/// Access key pair read from one profile
#[derive(Clone, PartialEq, Eq)]
pub struct ProfileCredentials {
    /// `aws_access_key_id`
    pub access_key_id: String,
    /// `aws_secret_access_key`
    pub secret_access_key: String,
    /// `aws_session_token`, for temporary credentials
    pub session_token: Option<String>,
}

impl std::fmt::Debug for ProfileCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Location of the shared credentials file, if one can be named
pub fn shared_credentials_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(SHARED_CREDENTIALS_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(".aws").join("credentials"))
}

/// Read `profile` from the credentials file at `path`.
///
/// A missing file, a missing profile or a profile without both keys is
/// `Ok(None)`; only an unreadable file is an error.
pub fn load_profile(path: &Path, profile: &str) -> ConfigResult<Option<ProfileCredentials>> {
    if !path.is_file() {
        return Ok(None);
    }

    let sections: HashMap<String, Value> = config::Config::builder()
        .add_source(File::from(path).format(FileFormat::Ini))
        .build()
        .and_then(|layered| layered.try_deserialize())
        .map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let Some(section) = sections
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(profile))
        .map(|(_, value)| value)
    else {
        return Ok(None);
    };
    let table = section.into_table().map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("profile '{}': {}", profile, e),
    })?;

    let get = |key: &str| {
        table
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .and_then(|(_, value)| value.clone().into_string().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    match (get("aws_access_key_id"), get("aws_secret_access_key")) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Some(ProfileCredentials {
            access_key_id,
            secret_access_key,
            session_token: get("aws_session_token"),
        })),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CREDENTIALS: &str = "\
[default]
aws_access_key_id = AKIDDEFAULT
aws_secret_access_key = default/secret+key

[Prod]
aws_access_key_id = AKIDPROD
aws_secret_access_key = prod-secret
aws_session_token = prod-session

[half]
aws_access_key_id = AKIDHALF
";

    fn credentials_file(temp_dir: &TempDir) -> PathBuf {
        let path = temp_dir.path().join("credentials");
        std::fs::write(&path, CREDENTIALS).unwrap();
        path
    }

    #[test]
    fn test_load_default_profile() {
        let temp_dir = TempDir::new().unwrap();
        let path = credentials_file(&temp_dir);

        let creds = load_profile(&path, "default").unwrap().unwrap();
        assert_eq!(creds.access_key_id, "AKIDDEFAULT");
        assert_eq!(creds.secret_access_key, "default/secret+key");
        assert_eq!(creds.session_token, None);
    }

    #[test]
    fn test_profile_names_ignore_case() {
        let temp_dir = TempDir::new().unwrap();
        let path = credentials_file(&temp_dir);

        let creds = load_profile(&path, "prod").unwrap().unwrap();
        assert_eq!(creds.access_key_id, "AKIDPROD");
        assert_eq!(creds.session_token.as_deref(), Some("prod-session"));
    }

    #[test]
    fn test_missing_or_incomplete_profiles() {
        let temp_dir = TempDir::new().unwrap();
        let path = credentials_file(&temp_dir);

        assert_eq!(load_profile(&path, "staging").unwrap(), None);
        assert_eq!(load_profile(&path, "half").unwrap(), None);
        assert_eq!(
            load_profile(&temp_dir.path().join("absent"), "default").unwrap(),
            None
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = ProfileCredentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "hunter2".to_string(),
            session_token: Some("token".to_string()),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("AKID"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("\"token\""));
    }
}
