//! Application configuration module
//!
//! [`AppConfig`] holds every tunable of the session layer: the cache
//! namespace and format version, the freshness window, the remote fetch
//! retry budget and the endpoints of the hosted identity and document
//! services. It can be built in code through [`AppConfigBuilder`] or parsed
//! from a TOML file; both paths run [`AppConfig::validate`].
//!
//! ```toml
//! namespace = "whogofixam"
//! cache_version = "3.0"
//! freshness_days = 30
//! fetch_attempts = 3
//! fetch_timeout_secs = 10
//! backoff_base_secs = 2
//! project_id = "whogofixam"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default cache key namespace
pub const DEFAULT_NAMESPACE: &str = "whogofixam";
/// Current cache format version; a different value on disk clears the cache
pub const DEFAULT_CACHE_VERSION: &str = "3.0";
/// Days a cache entry stays fresh after its last sync
pub const DEFAULT_FRESHNESS_DAYS: u32 = 30;
/// Foreground profile fetch attempts
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
/// Per-attempt fetch timeout in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
/// Backoff base in seconds, multiplied by the attempt number
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 2;
/// Background refresh attempts
pub const DEFAULT_REFRESH_ATTEMPTS: u32 = 1;
/// Identity toolkit REST base URL
pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
/// Document database REST base URL
pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Prefix of every local cache key
    pub namespace: String,
    /// Cache format version marker
    pub cache_version: String,
    /// Freshness window in days
    pub freshness_days: u32,
    /// Foreground fetch attempts
    pub fetch_attempts: u32,
    /// Per-attempt timeout in seconds
    pub fetch_timeout_secs: u64,
    /// Backoff base in seconds
    pub backoff_base_secs: u64,
    /// Background refresh attempts
    pub refresh_attempts: u32,
    /// API key for the identity toolkit
    pub api_key: Option<String>,
    /// Hosted project identifier
    pub project_id: Option<String>,
    /// Identity toolkit base URL
    pub identity_url: String,
    /// Document database base URL
    pub firestore_url: String,
    /// SQLite cache file; `None` uses the platform data directory
    pub cache_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            freshness_days: DEFAULT_FRESHNESS_DAYS,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            refresh_attempts: DEFAULT_REFRESH_ATTEMPTS,
            api_key: None,
            project_id: None,
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            firestore_url: DEFAULT_FIRESTORE_URL.to_string(),
            cache_path: None,
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::MissingValue("namespace"));
        }
        if self.namespace.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidValue {
                field: "namespace",
                message: "must not contain whitespace".to_string(),
            });
        }
        if self.cache_version.is_empty() {
            return Err(ConfigError::MissingValue("cache_version"));
        }
        if self.freshness_days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "freshness_days",
                message: "must be at least 1".to_string(),
            });
        }
        if self.fetch_attempts == 0 || self.refresh_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fetch_attempts",
                message: "attempt budgets must be at least 1".to_string(),
            });
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fetch_timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        for (field, url) in [
            ("identity_url", &self.identity_url),
            ("firestore_url", &self.firestore_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(format!("{field}: {url}")));
            }
        }
        Ok(())
    }

    /// Freshness window as a chrono duration
    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.freshness_days))
    }

    /// Per-attempt fetch timeout
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Backoff base
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn cache_version(mut self, version: impl Into<String>) -> Self {
        self.config.cache_version = version.into();
        self
    }

    pub fn freshness_days(mut self, days: u32) -> Self {
        self.config.freshness_days = days;
        self
    }

    pub fn fetch_attempts(mut self, attempts: u32) -> Self {
        self.config.fetch_attempts = attempts;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn backoff_base_secs(mut self, secs: u64) -> Self {
        self.config.backoff_base_secs = secs;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn project_id(mut self, project: impl Into<String>) -> Self {
        self.config.project_id = Some(project.into());
        self
    }

    pub fn identity_url(mut self, url: impl Into<String>) -> Self {
        self.config.identity_url = url.into();
        self
    }

    pub fn firestore_url(mut self, url: impl Into<String>) -> Self {
        self.config.firestore_url = url.into();
        self
    }

    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_path = Some(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
