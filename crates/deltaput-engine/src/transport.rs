//! Object store transports
//!
//! The scheduler only knows the [`Transport`] trait. Two stores ship with
//! deltaput: [`HttpTransport`] issues S3-style `PUT` requests, SigV4-signed
//! or with a bearer token, and [`DirectoryTransport`] mirrors objects into a
//! local directory, which is what `file://` endpoints select.

use crate::signing::{uri_encode, AwsCredentials, SigV4Signer};
use crate::source_file::SourceFile;
use async_trait::async_trait;
use chrono::Utc;
use deltaput_config::{Config, RunFlags};
use deltaput_types::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Canned ACL header name
pub const ACL_HEADER: &str = "x-amz-acl";
/// Every object is world readable
pub const ACL_PUBLIC_READ: &str = "public-read";

const FILE_SCHEME: &str = "file://";

/// Something that can store one object
#[async_trait]
pub trait Transport: Send + Sync {
    /// Store `body` under the key of `file` with its resolved headers.
    ///
    /// Calls must be idempotent; concurrent calls for different files must
    /// not interfere.
    async fn put(&self, file: &SourceFile, body: Vec<u8>) -> Result<()>;
}

/// How requests to an HTTP store are authenticated
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    /// Sign every request with AWS Signature Version 4
    Aws(AwsCredentials),
    /// Send `Authorization: Bearer`, for stores behind a custom endpoint
    Bearer(String),
    /// Send requests unauthenticated
    #[default]
    Anonymous,
}

impl Credentials {
    /// Credentials with an explicit bearer token
    pub fn with_token(token: impl Into<String>) -> Self {
        Self::Bearer(token.into())
    }

    /// Look up `DELTAPUT_<PROFILE>_TOKEN`, then `DELTAPUT_TOKEN`
    pub fn bearer_from_env(profile: Option<&str>) -> Option<Self> {
        let profile_token = profile
            .map(profile_env_var)
            .and_then(|name| std::env::var(name).ok());
        profile_token
            .or_else(|| std::env::var("DELTAPUT_TOKEN").ok())
            .filter(|t| !t.is_empty())
            .map(Self::Bearer)
    }

    /// Credentials for the store `config` targets.
    ///
    /// The AWS endpoint only accepts signed requests. A custom endpoint
    /// takes a deltaput token when one is set and AWS keys otherwise.
    pub fn resolve(config: &Config) -> Result<Self> {
        let profile = config.profile.as_deref();
        if config.endpoint.is_some() {
            if let Some(bearer) = Self::bearer_from_env(profile) {
                return Ok(bearer);
            }
        }
        if let Some(aws) = AwsCredentials::resolve(profile)? {
            return Ok(Self::Aws(aws));
        }

        let hint = if config.endpoint.is_some() {
            format!(
                "; or set {} or DELTAPUT_TOKEN",
                profile_env_var(profile.unwrap_or("default"))
            )
        } else {
            String::new()
        };
        Err(Error::auth(format!(
            "No credentials found for profile '{}'. Set AWS_ACCESS_KEY_ID and \
             AWS_SECRET_ACCESS_KEY or add the profile to the shared credentials file{}",
            profile.unwrap_or("default"),
            hint
        )))
    }
}

fn profile_env_var(profile: &str) -> String {
    let profile: String = profile
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("DELTAPUT_{}_TOKEN", profile)
}

/// S3-style HTTP object store
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: reqwest::Url,
    bucket: String,
    region: String,
    credentials: Credentials,
}

impl HttpTransport {
    /// Create a transport for `bucket` in `region` at `endpoint`
    pub fn new(
        endpoint: &str,
        bucket: &str,
        region: &str,
        credentials: Credentials,
    ) -> Result<Self> {
        let base_url = reqwest::Url::parse(endpoint)
            .map_err(|e| Error::config(format!("Invalid endpoint '{}': {}", endpoint, e)))?;
        if base_url.cannot_be_a_base() || base_url.host_str().is_none() {
            return Err(Error::config(format!("Invalid endpoint '{}'", endpoint)));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            bucket: bucket.to_string(),
            region: region.to_string(),
            credentials,
        })
    }

    /// Default endpoint for `region`
    pub fn region_endpoint(region: &str) -> String {
        format!("https://s3.{}.amazonaws.com", region)
    }

    /// URL of the object stored under `key`.
    ///
    /// Bucket and key segments are strictly percent-encoded so the path can
    /// be signed as is.
    pub fn object_url(&self, key: &str) -> Result<reqwest::Url> {
        let mut path = self.base_url.path().trim_end_matches('/').to_string();
        for segment in std::iter::once(self.bucket.as_str()).chain(key.split('/')) {
            path.push('/');
            path.push_str(&uri_encode(segment));
        }

        let mut url = self.base_url.clone();
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn put(&self, file: &SourceFile, body: Vec<u8>) -> Result<()> {
        let url = self.object_url(file.name())?;

        let mut headers: Vec<(String, String)> =
            vec![(ACL_HEADER.to_string(), ACL_PUBLIC_READ.to_string())];
        headers.extend(
            file.headers()
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string())),
        );
        if let Credentials::Aws(aws) = &self.credentials {
            let signer = SigV4Signer::new(aws.clone(), self.region.as_str());
            let signed = signer.sign("PUT", &url, &headers, &body, Utc::now())?;
            headers.extend(signed);
        }

        let mut request = self.client.put(url).body(body);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Credentials::Bearer(token) = &self.credentials {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(error_chain(&e)))?;

        let status = response.status();
        if status.is_success() {
            debug!("PUT {} -> {}", file.name(), status);
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(Error::transport(format!(
            "PUT {} failed with status {}: {}",
            file.name(),
            status,
            detail.trim()
        )))
    }
}

/// Render an error with all of its sources so the innermost cause ends the
/// message
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Local directory acting as an object store
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    root: PathBuf,
}

impl DirectoryTransport {
    /// Store objects below `root`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Target directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Transport for DirectoryTransport {
    async fn put(&self, file: &SourceFile, body: Vec<u8>) -> Result<()> {
        let target = self.root.join(file.name());
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::transport(format!("Failed to create '{}': {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&target, body).await.map_err(|e| {
            Error::transport(format!("Failed to write '{}': {}", target.display(), e))
        })?;
        debug!("Stored {} at '{}'", file.name(), target.display());
        Ok(())
    }
}

/// Stand-in for runs that never send anything (dry runs, `--upload=false`)
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTransport;

#[async_trait]
impl Transport for OfflineTransport {
    async fn put(&self, file: &SourceFile, _body: Vec<u8>) -> Result<()> {
        Err(Error::transport(format!(
            "uploads are disabled, not sending {}",
            file.name()
        )))
    }
}

/// Transport for a run: offline when nothing will be sent, so that dry runs
/// need no credentials
pub fn for_run(config: &Config, flags: &RunFlags) -> Result<Arc<dyn Transport>> {
    if flags.dry_run || !flags.do_upload {
        return Ok(Arc::new(OfflineTransport));
    }
    from_config(config)
}

/// Pick the transport `config` asks for.
///
/// HTTP stores need credentials; missing ones are an authentication error.
pub fn from_config(config: &Config) -> Result<Arc<dyn Transport>> {
    if let Some(dir) = config
        .endpoint
        .as_deref()
        .and_then(|e| e.strip_prefix(FILE_SCHEME))
    {
        return Ok(Arc::new(DirectoryTransport::new(Path::new(dir).join(&config.bucket))));
    }

    let credentials = Credentials::resolve(config)?;
    let endpoint = config
        .endpoint
        .clone()
        .unwrap_or_else(|| HttpTransport::region_endpoint(&config.region));
    Ok(Arc::new(HttpTransport::new(
        &endpoint,
        &config.bucket,
        &config.region,
        credentials,
    )?))
}
