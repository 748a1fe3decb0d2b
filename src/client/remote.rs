//! # Remote Profile Store
//!
//! One document per user in the hosted document database, consumed through
//! the [`ProfileStore`] trait:
//!
//! - `read_profile(uid)` returns `Ok(None)` when no document exists
//! - `write_profile(uid, profile)` replaces the whole document
//! - `update_profile(uid, update)` merges the given fields into an existing
//!   document
//! - `enable_network()` / `disable_network()` toggle whether calls may leave
//!   the process
//!
//! [`FirestoreClient`] implements it over the document REST API. Documents
//! use typed field values (`stringValue`, `nullValue`, `timestampValue`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::watch;

use crate::client::types::Identity;
use crate::shared::{AppConfig, ConfigError, UserProfile, UserRole};

/// Remote profile store failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("profile store unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("unexpected response {status}: {message}")]
    Http { status: u16, message: String },

    #[error("malformed document: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether repeating the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Partial profile fields for a merge update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileUpdate {
    /// Role assignment stamped now
    pub fn role(role: UserRole) -> Self {
        Self {
            role: Some(role),
            display_name: None,
            updated_at: Utc::now(),
        }
    }

    pub fn apply_to(&self, profile: &mut UserProfile) {
        if let Some(role) = self.role {
            profile.role = Some(role);
        }
        if let Some(name) = &self.display_name {
            profile.display_name = Some(name.clone());
        }
        profile.updated_at = self.updated_at;
    }

    /// Combine with a newer update; the newer value wins per field
    pub fn merged(self, newer: ProfileUpdate) -> ProfileUpdate {
        ProfileUpdate {
            role: newer.role.or(self.role),
            display_name: newer.display_name.or(self.display_name),
            updated_at: newer.updated_at.max(self.updated_at),
        }
    }

    /// Document field paths touched by this update
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::with_capacity(3);
        if self.role.is_some() {
            paths.push("role");
        }
        if self.display_name.is_some() {
            paths.push("displayName");
        }
        paths.push("updatedAt");
        paths
    }
}

/// External document database holding one profile per user
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn read_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError>;

    async fn write_profile(&self, uid: &str, profile: &UserProfile) -> Result<(), StoreError>;

    async fn update_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<(), StoreError>;

    async fn enable_network(&self) -> Result<(), StoreError>;

    async fn disable_network(&self) -> Result<(), StoreError>;
}

/// REST client for the hosted document database
#[derive(Debug)]
pub struct FirestoreClient {
    http: Client,
    documents_url: String,
    identity: watch::Receiver<Option<Identity>>,
    network_enabled: AtomicBool,
}

impl FirestoreClient {
    /// `identity` supplies the bearer token of the signed-in user
    pub fn new(
        config: &AppConfig,
        identity: watch::Receiver<Option<Identity>>,
    ) -> Result<Self, ConfigError> {
        let project = config
            .project_id
            .as_deref()
            .ok_or(ConfigError::MissingValue("project_id"))?;
        Ok(Self {
            http: Client::new(),
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                config.firestore_url.trim_end_matches('/'),
                project
            ),
            identity,
            network_enabled: AtomicBool::new(true),
        })
    }

    fn document_url(&self, uid: &str) -> String {
        format!("{}/users/{}", self.documents_url, uid)
    }

    fn bearer_token(&self) -> Option<String> {
        self.identity
            .borrow()
            .as_ref()
            .and_then(|identity| identity.id_token.clone())
    }

    fn ensure_network(&self) -> Result<(), StoreError> {
        if self.network_enabled.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("network disabled".to_string()))
        }
    }

    fn request(&self, method: reqwest::Method, uid: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.document_url(uid));
        match self.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status, &body))
    }
}

fn error_from_response(status: StatusCode, body: &str) -> StoreError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| status.to_string());

    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::PermissionDenied(message),
        StatusCode::TOO_MANY_REQUESTS => StoreError::Unavailable(message),
        s if s.is_server_error() => StoreError::Unavailable(message),
        s => StoreError::Http {
            status: s.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl ProfileStore for FirestoreClient {
    async fn read_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        self.ensure_network()?;
        let response = match self.send(self.request(reqwest::Method::GET, uid)).await {
            Ok(response) => response,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let document: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        decode_document(uid, &document).map(Some)
    }

    async fn write_profile(&self, uid: &str, profile: &UserProfile) -> Result<(), StoreError> {
        self.ensure_network()?;
        let builder = self
            .request(reqwest::Method::PATCH, uid)
            .json(&encode_profile(profile));
        self.send(builder).await?;
        tracing::debug!(uid, "profile document written");
        Ok(())
    }

    async fn update_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<(), StoreError> {
        self.ensure_network()?;
        let mut query: Vec<(&str, &str)> = update
            .field_paths()
            .into_iter()
            .map(|path| ("updateMask.fieldPaths", path))
            .collect();
        query.push(("currentDocument.exists", "true"));

        let builder = self
            .request(reqwest::Method::PATCH, uid)
            .query(&query)
            .json(&encode_update(update));
        self.send(builder).await?;
        tracing::debug!(uid, fields = ?update.field_paths(), "profile document updated");
        Ok(())
    }

    async fn enable_network(&self) -> Result<(), StoreError> {
        self.network_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disable_network(&self) -> Result<(), StoreError> {
        self.network_enabled.store(false, Ordering::SeqCst);
        Ok(())
    }
}

fn string_value(value: Option<&str>) -> Value {
    match value {
        Some(s) => json!({ "stringValue": s }),
        None => json!({ "nullValue": null }),
    }
}

fn timestamp_value(at: &DateTime<Utc>) -> Value {
    json!({ "timestampValue": at.to_rfc3339() })
}

/// Full document body for a profile
pub fn encode_profile(profile: &UserProfile) -> Value {
    json!({
        "fields": {
            "uid": string_value(Some(&profile.uid)),
            "email": string_value(profile.email.as_deref()),
            "phoneNumber": string_value(profile.phone_number.as_deref()),
            "displayName": string_value(profile.display_name.as_deref()),
            "role": string_value(profile.role.map(|r| r.as_str())),
            "createdAt": timestamp_value(&profile.created_at),
            "updatedAt": timestamp_value(&profile.updated_at),
        }
    })
}

/// Document body carrying only the fields of `update`
pub fn encode_update(update: &ProfileUpdate) -> Value {
    let mut fields = Map::new();
    if let Some(role) = update.role {
        fields.insert("role".to_string(), string_value(Some(role.as_str())));
    }
    if let Some(name) = &update.display_name {
        fields.insert("displayName".to_string(), string_value(Some(name)));
    }
    fields.insert("updatedAt".to_string(), timestamp_value(&update.updated_at));
    json!({ "fields": fields })
}

/// Profile from a document; missing timestamps default to now
pub fn decode_document(uid: &str, document: &Value) -> Result<UserProfile, StoreError> {
    let fields = document
        .get("fields")
        .and_then(Value::as_object)
        .ok_or_else(|| StoreError::Decode("document has no fields".to_string()))?;

    let text = |name: &str| {
        fields
            .get(name)
            .and_then(|f| f.get("stringValue"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let timestamp = |name: &str| {
        fields
            .get(name)
            .and_then(|f| f.get("timestampValue"))
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc))
    };

    let role = match text("role") {
        Some(raw) => match raw.parse::<UserRole>() {
            Ok(role) => Some(role),
            Err(e) => {
                tracing::warn!(uid, error = %e, "ignoring unknown role in profile document");
                None
            }
        },
        None => None,
    };

    let now = Utc::now();
    Ok(UserProfile {
        uid: uid.to_string(),
        email: text("email"),
        phone_number: text("phoneNumber"),
        display_name: text("displayName"),
        role,
        created_at: timestamp("createdAt").unwrap_or(now),
        updated_at: timestamp("updatedAt").unwrap_or(now),
    })
}
