//! Client configuration
//!
//! Wraps [`AppConfig`] with the environment of the running process. The base
//! configuration comes from the TOML file named by `WHOGOFIXAM_CONFIG` when
//! set, otherwise from defaults; the remaining variables override single
//! fields:
//!
//! | variable                   | field            |
//! |----------------------------|------------------|
//! | `WHOGOFIXAM_API_KEY`       | `api_key`        |
//! | `WHOGOFIXAM_PROJECT_ID`    | `project_id`     |
//! | `WHOGOFIXAM_IDENTITY_URL`  | `identity_url`   |
//! | `WHOGOFIXAM_FIRESTORE_URL` | `firestore_url`  |
//! | `WHOGOFIXAM_CACHE_PATH`    | `cache_path`     |

use std::path::PathBuf;

use crate::client::local_db::LocalDatabase;
use crate::shared::config::{AppConfig, ConfigError};

const CONFIG_FILE_VAR: &str = "WHOGOFIXAM_CONFIG";
const API_KEY_VAR: &str = "WHOGOFIXAM_API_KEY";
const PROJECT_ID_VAR: &str = "WHOGOFIXAM_PROJECT_ID";
const IDENTITY_URL_VAR: &str = "WHOGOFIXAM_IDENTITY_URL";
const FIRESTORE_URL_VAR: &str = "WHOGOFIXAM_FIRESTORE_URL";
const CACHE_PATH_VAR: &str = "WHOGOFIXAM_CACHE_PATH";

/// Application configuration wrapper.
#[derive(Debug, Clone, Default)]
pub struct Config {
    app: AppConfig,
}

impl Config {
    /// Load from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match env_value(CONFIG_FILE_VAR) {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };
        Self::with_overrides(base)
    }

    /// Apply environment overrides on top of `app` and validate the result
    pub fn with_overrides(mut app: AppConfig) -> Result<Self, ConfigError> {
        if let Some(key) = env_value(API_KEY_VAR) {
            app.api_key = Some(key);
        }
        if let Some(project) = env_value(PROJECT_ID_VAR) {
            app.project_id = Some(project);
        }
        if let Some(url) = env_value(IDENTITY_URL_VAR) {
            app.identity_url = url;
        }
        if let Some(url) = env_value(FIRESTORE_URL_VAR) {
            app.firestore_url = url;
        }
        if let Some(path) = env_value(CACHE_PATH_VAR) {
            app.cache_path = Some(PathBuf::from(path));
        }
        app.validate()?;
        Ok(Self { app })
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// SQLite cache file, falling back to the platform data directory
    pub fn cache_path(&self) -> PathBuf {
        self.app
            .cache_path
            .clone()
            .unwrap_or_else(LocalDatabase::default_path)
    }

    /// Whether both hosted services are configured
    pub fn has_remote_services(&self) -> bool {
        self.app.api_key.is_some() && self.app.project_id.is_some()
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
