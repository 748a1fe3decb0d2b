//! Session error types
//!
//! Only credential primitives (sign-up, login, phone verification) and
//! session setup return errors to the caller. Connectivity failures inside
//! the reconciler are logged and turned into fallbacks instead.

use thiserror::Error;

use crate::client::auth::AuthError;
use crate::client::local_db::StorageError;
use crate::shared::ConfigError;

/// Errors returned by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("operation requires a signed-in user")]
    NotSignedIn,

    #[error("local cache error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Provider error code for credential failures, for inline form errors
    pub fn credential_code(&self) -> Option<&str> {
        match self {
            SessionError::Auth(error @ AuthError::Credential { .. }) => Some(error.code()),
            _ => None,
        }
    }
}
