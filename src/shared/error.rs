//! Shared Error Types
//!
//! Errors raised while building, parsing or validating the types in
//! [`crate::shared`]. They are plain data and carry no I/O context, so the
//! client layer can wrap them in its own error enums.
//!
//! # Error Categories
//!
//! - `SerializationError` - JSON serialization/deserialization failures
//! - `ValidationError` - a field holds a value outside its allowed set
//!
//! # Usage
//!
//! ```rust
//! use whogofixam::shared::error::SharedError;
//!
//! let error = SharedError::validation("role", "unknown role 'admin'");
//! assert!(error.to_string().contains("role"));
//! ```
use thiserror::Error;

/// Errors produced by the shared profile and configuration types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}
