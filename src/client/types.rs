//! Identity Types
//!
//! The signed-in identity reported by the identity provider, and the request
//! and response bodies of the identity toolkit REST API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity reported by the identity provider
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub display_name: Option<String>,
    /// Bearer token for the document store
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            phone_number: None,
            display_name: None,
            id_token: None,
            refresh_token: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("phone_number", &self.phone_number)
            .field("display_name", &self.display_name)
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// `accounts:signUp` and `accounts:signInWithPassword` body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub return_secure_token: bool,
}

/// `accounts:update` body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest<'a> {
    pub id_token: &'a str,
    pub display_name: &'a str,
    pub return_secure_token: bool,
}

/// `accounts:sendVerificationCode` body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendVerificationCodeRequest<'a> {
    pub phone_number: &'a str,
    pub recaptcha_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendVerificationCodeResponse {
    pub session_info: String,
}

/// `accounts:signInWithPhoneNumber` body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneSignInRequest<'a> {
    pub session_info: &'a str,
    pub code: &'a str,
}

/// Account response shared by the sign-up, sign-in and update endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountResponse {
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl AccountResponse {
    /// Build an identity, keeping fields of `previous` the response omits
    pub fn into_identity(self, previous: Option<&Identity>) -> Identity {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        Identity {
            uid: if self.local_id.is_empty() {
                previous.map(|p| p.uid.clone()).unwrap_or_default()
            } else {
                self.local_id
            },
            email: non_empty(self.email).or_else(|| previous.and_then(|p| p.email.clone())),
            display_name: non_empty(self.display_name)
                .or_else(|| previous.and_then(|p| p.display_name.clone())),
            phone_number: non_empty(self.phone_number)
                .or_else(|| previous.and_then(|p| p.phone_number.clone())),
            id_token: self.id_token.or_else(|| previous.and_then(|p| p.id_token.clone())),
            refresh_token: self
                .refresh_token
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
        }
    }
}

/// Error envelope returned on non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}
