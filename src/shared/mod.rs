//! Shared Types Module
//!
//! Platform-agnostic types used by the client session layer and its
//! collaborators:
//!
//! - **`profile`** - `UserProfile` and `UserRole`
//! - **`config`** - `AppConfig` and its builder
//! - **`error`** - `SharedError`

pub mod config;
pub mod error;
pub mod profile;

pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::SharedError;
pub use profile::{UserProfile, UserRole};
