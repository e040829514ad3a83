//! Per-file header resolution
//!
//! Rules are tried in order and the first pattern that matches a file's
//! relative path supplies its headers. Every file also gets a
//! `Content-Type`, and the encrypt flag adds the server-side-encryption
//! header regardless of which rule matched.

use deltaput_config::{Config, HeaderRuleConfig, CONTENT_ENCODING};
use deltaput_types::{Error, Result};
use regex::Regex;
use std::path::Path;

/// Content-Type header name
pub const CONTENT_TYPE: &str = "Content-Type";
/// Server-side encryption header name
pub const SERVER_SIDE_ENCRYPTION: &str = "x-amz-server-side-encryption";
/// Value of the server-side encryption header
pub const SERVER_SIDE_ENCRYPTION_AES256: &str = "AES256";

const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "woff", "woff2", "eot"];
const FONT_TYPE: &str = "binary/octet-stream";
const DEFAULT_TYPE: &str = "application/octet-stream";

/// Ordered header list with case-insensitive names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    headers: Vec<(String, String)>,
}

impl HeaderSet {
    /// Create an empty header set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any existing value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Value of `name`, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Remove `name`, returning its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .headers
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))?;
        Some(self.headers.remove(index).1)
    }

    /// Whether the body must be gzipped before sending
    pub fn is_gzip(&self) -> bool {
        self.get(CONTENT_ENCODING)
            .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
    }

    /// Number of headers
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Iterate `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

/// A compiled pattern and the headers it applies
#[derive(Debug, Clone)]
pub struct HeaderRule {
    pattern: Regex,
    headers: HeaderSet,
}

impl HeaderRule {
    /// Compile a rule
    pub fn new(pattern: &str, headers: HeaderSet) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::config(format!("Invalid header pattern '{}': {}", pattern, e)))?;
        Ok(Self { pattern, headers })
    }

    /// Whether the rule applies to `path`
    pub fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }
}

impl TryFrom<&HeaderRuleConfig> for HeaderRule {
    type Error = Error;

    fn try_from(rule: &HeaderRuleConfig) -> Result<Self> {
        Self::new(&rule.pattern, rule.headers.iter().collect())
    }
}

/// Decides how each file is sent
#[derive(Debug, Clone)]
pub struct HeaderResolver {
    rules: Vec<HeaderRule>,
    encrypt: bool,
    gzip: bool,
}

impl HeaderResolver {
    /// Create a resolver from an ordered rule list
    pub fn new(rules: Vec<HeaderRule>) -> Self {
        Self {
            rules,
            encrypt: false,
            gzip: true,
        }
    }

    /// Compile the rules and flags of `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let rules = config
            .header_rules
            .iter()
            .map(HeaderRule::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(rules)
            .with_encryption(config.encrypt)
            .with_gzip(config.gzip))
    }

    /// Add the server-side-encryption header to every file
    pub fn with_encryption(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    /// When off, `Content-Encoding` is dropped and nothing gets gzipped
    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    /// Headers for the file at relative `path`
    pub fn resolve(&self, path: &str) -> HeaderSet {
        let mut headers = HeaderSet::new();
        headers.insert(CONTENT_TYPE, content_type(path));

        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(path)) {
            for (name, value) in rule.headers.iter() {
                headers.insert(name, value);
            }
        }

        if !self.gzip {
            headers.remove(CONTENT_ENCODING);
        }

        if self.encrypt {
            headers.insert(SERVER_SIDE_ENCRYPTION, SERVER_SIDE_ENCRYPTION_AES256);
        }

        headers
    }
}

/// MIME type for `path`, judged by its extension.
///
/// Web fonts are always sent as `binary/octet-stream`.
pub fn content_type(path: &str) -> String {
    let path = Path::new(path);

    let is_font = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            FONT_EXTENSIONS
                .iter()
                .any(|font| font.eq_ignore_ascii_case(ext))
        });
    if is_font {
        return FONT_TYPE.to_string();
    }

    match mime_guess::from_path(path).first() {
        Some(mime)
            if mime.type_() == mime_guess::mime::TEXT && mime.get_param("charset").is_none() =>
        {
            format!("{}; charset=utf-8", mime.essence_str())
        }
        Some(mime) => mime.to_string(),
        None => DEFAULT_TYPE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltaput_config::{default_header_rules, CACHE_CONTROL};
    use rstest::rstest;

    fn default_resolver() -> HeaderResolver {
        HeaderResolver::from_config(&Config::default()).unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let specific = HeaderRule::new(
            r"index\.html",
            [(CACHE_CONTROL, "max-age=1800")].into_iter().collect(),
        )
        .unwrap();
        let general = HeaderRule::new(
            r"\.html$",
            [(CACHE_CONTROL, "max-age=3600"), ("X-General", "yes")]
                .into_iter()
                .collect(),
        )
        .unwrap();

        let resolver = HeaderResolver::new(vec![specific, general]);
        let headers = resolver.resolve("index.html");

        assert_eq!(headers.get(CACHE_CONTROL), Some("max-age=1800"));
        assert_eq!(headers.get("X-General"), None);
    }

    #[test]
    fn test_unmatched_file_only_gets_content_type() {
        let headers = default_resolver().resolve("notes/readme.md");
        assert_eq!(headers.len(), 1);
        assert!(headers.get(CONTENT_TYPE).is_some());
        assert!(!headers.is_gzip());
    }

    #[rstest]
    #[case("index.html", true, "max-age=1800")]
    #[case("articole/2019/post.html", true, "max-age=86400")]
    #[case("about.html", true, "max-age=3600")]
    #[case("sitemap.xml", true, "max-age=1800")]
    #[case("favicon.ico", true, "max-age=31536000")]
    #[case("js/app.js", true, "max-age=31536000")]
    #[case("images/articole/cover.JPG", false, "max-age=31536000")]
    #[case("logo.png", false, "max-age=31536000")]
    fn test_default_rules(#[case] path: &str, #[case] gzip: bool, #[case] cache: &str) {
        let headers = default_resolver().resolve(path);
        assert_eq!(headers.is_gzip(), gzip, "{}", path);
        assert_eq!(headers.get(CACHE_CONTROL), Some(cache), "{}", path);
    }

    #[test]
    fn test_gzip_toggle_off() {
        let resolver = default_resolver().with_gzip(false);
        let headers = resolver.resolve("index.html");
        assert!(!headers.is_gzip());
        assert_eq!(headers.get(CONTENT_ENCODING), None);
        assert_eq!(headers.get(CACHE_CONTROL), Some("max-age=1800"));
    }

    #[test]
    fn test_encryption_is_unconditional() {
        let resolver = default_resolver().with_encryption(true);
        for path in ["index.html", "unmatched.bin"] {
            assert_eq!(
                resolver.resolve(path).get(SERVER_SIDE_ENCRYPTION),
                Some(SERVER_SIDE_ENCRYPTION_AES256)
            );
        }
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let rules = vec![HeaderRule::new(
            r"\.css$",
            [("content-encoding", "gzip")].into_iter().collect(),
        )
        .unwrap()];
        let headers = HeaderResolver::new(rules).resolve("site.css");
        assert!(headers.is_gzip());
        assert_eq!(headers.get(CONTENT_ENCODING), Some("gzip"));
    }

    #[rstest]
    #[case("index.html", "text/html; charset=utf-8")]
    #[case("style.css", "text/css; charset=utf-8")]
    #[case("logo.png", "image/png")]
    #[case("fonts/icons.ttf", "binary/octet-stream")]
    #[case("fonts/Icons.WOFF2", "binary/octet-stream")]
    #[case("fonts/old.eot", "binary/octet-stream")]
    #[case("data.unknownext", "application/octet-stream")]
    #[case("noextension", "application/octet-stream")]
    fn test_content_type(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(content_type(path), expected);
    }

    #[test]
    fn test_invalid_pattern() {
        let mut config = Config::default();
        config.header_rules = default_header_rules();
        config
            .header_rules
            .push(HeaderRuleConfig::new("([", &[]));
        assert!(HeaderResolver::from_config(&config).is_err());
    }
}
