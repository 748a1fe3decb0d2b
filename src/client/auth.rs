//! # Identity Provider
//!
//! The session layer consumes sign-up, sign-in, sign-out and phone
//! verification from an external identity service through the
//! [`IdentityProvider`] trait. Identity changes are published on a
//! `tokio::sync::watch` channel; the reconciler listens on it.
//!
//! [`IdentityToolkitClient`] implements the trait against the hosted identity
//! toolkit REST API with `reqwest`.
//!
//! ## Errors
//!
//! Credential problems (wrong password, duplicate email, bad verification
//! code) come back as [`AuthError::Credential`] so a form can show them.
//! Transport failures, 5xx and 429 responses map to
//! [`AuthError::Unavailable`], which switches the session into offline mode.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::client::types::{
    AccountResponse, ErrorEnvelope, Identity, PasswordRequest, PhoneSignInRequest,
    SendVerificationCodeRequest, SendVerificationCodeResponse, UpdateAccountRequest,
};
use crate::shared::{AppConfig, ConfigError};

/// Identity provider failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Rejected credentials, carrying the provider's error code
    #[error("{code}: {message}")]
    Credential { code: String, message: String },

    /// The provider could not be reached
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("no user is signed in")]
    NotSignedIn,

    #[error("unexpected identity provider response: {0}")]
    Protocol(String),
}

impl AuthError {
    pub fn credential(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Credential {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Provider-style error code
    pub fn code(&self) -> &str {
        match self {
            AuthError::Credential { code, .. } => code,
            AuthError::Unavailable(_) => "unavailable",
            AuthError::NotSignedIn => "no-current-user",
            AuthError::Protocol(_) => "internal-error",
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, AuthError::Unavailable(_))
    }
}

/// Handle returned by [`IdentityProvider::send_phone_verification`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneConfirmation {
    pub phone_number: String,
    pub session_info: String,
}

/// External authentication service
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account and sign it in
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Update the display name of `identity`; does not emit an identity change
    async fn set_display_name(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> Result<Identity, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Send a verification code; `challenge` is the bot-check token
    async fn send_phone_verification(
        &self,
        phone_number: &str,
        challenge: &str,
    ) -> Result<PhoneConfirmation, AuthError>;

    /// Confirm a code and sign in
    async fn confirm_phone(
        &self,
        confirmation: &PhoneConfirmation,
        code: &str,
    ) -> Result<Identity, AuthError>;

    fn current(&self) -> Option<Identity>;

    /// Current identity now, then every change
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

/// REST client for the hosted identity toolkit
#[derive(Debug)]
pub struct IdentityToolkitClient {
    http: Client,
    base_url: String,
    api_key: String,
    session: watch::Sender<Option<Identity>>,
}

impl IdentityToolkitClient {
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ConfigError::MissingValue("api_key"))?;
        let (session, _) = watch::channel(None);
        Ok(Self {
            http: Client::new(),
            base_url: config.identity_url.trim_end_matches('/').to_string(),
            api_key,
            session,
        })
    }

    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R, AuthError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/accounts:{}", self.base_url, endpoint);
        tracing::debug!(endpoint, "identity toolkit request");

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| AuthError::Protocol(format!("failed to parse response: {}", e)));
        }

        let text = response.text().await.unwrap_or_default();
        Err(error_from_response(status, &text))
    }

    fn publish(&self, identity: Option<Identity>) {
        self.session.send_replace(identity);
    }
}

/// Map a non-2xx response onto the error taxonomy
fn error_from_response(status: StatusCode, body: &str) -> AuthError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| status.to_string());

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return AuthError::Unavailable(message);
    }

    // Messages look like "WEAK_PASSWORD : Password should be at least 6 characters"
    let code = message
        .split(" : ")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    AuthError::Credential { code, message }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitClient {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: AccountResponse = self.post("signUp", &request).await?;
        let identity = response.into_identity(None);
        tracing::info!(uid = %identity.uid, "account created");
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn set_display_name(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> Result<Identity, AuthError> {
        let id_token = identity.id_token.as_deref().ok_or(AuthError::NotSignedIn)?;
        let request = UpdateAccountRequest {
            id_token,
            display_name,
            return_secure_token: true,
        };
        let response: AccountResponse = self.post("update", &request).await?;
        let updated = response.into_identity(Some(identity));

        // Same user, new attributes: not an identity change.
        self.session.send_if_modified(|current| {
            if let Some(current) = current.as_mut().filter(|c| c.uid == updated.uid) {
                *current = updated.clone();
            }
            false
        });
        Ok(updated)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: AccountResponse = self.post("signInWithPassword", &request).await?;
        let identity = response.into_identity(None);
        tracing::info!(uid = %identity.uid, "signed in with password");
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.publish(None);
        Ok(())
    }

    async fn send_phone_verification(
        &self,
        phone_number: &str,
        challenge: &str,
    ) -> Result<PhoneConfirmation, AuthError> {
        let request = SendVerificationCodeRequest {
            phone_number,
            recaptcha_token: challenge,
        };
        let response: SendVerificationCodeResponse =
            self.post("sendVerificationCode", &request).await?;
        Ok(PhoneConfirmation {
            phone_number: phone_number.to_string(),
            session_info: response.session_info,
        })
    }

    async fn confirm_phone(
        &self,
        confirmation: &PhoneConfirmation,
        code: &str,
    ) -> Result<Identity, AuthError> {
        let request = PhoneSignInRequest {
            session_info: &confirmation.session_info,
            code,
        };
        let response: AccountResponse = self.post("signInWithPhoneNumber", &request).await?;
        let mut identity = response.into_identity(None);
        if identity.phone_number.is_none() {
            identity.phone_number = Some(confirmation.phone_number.clone());
        }
        tracing::info!(uid = %identity.uid, "signed in with phone number");
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    fn current(&self) -> Option<Identity> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}
