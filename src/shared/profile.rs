//! User Profile Types
//!
//! The profile is the only entity the session layer reasons about: identity
//! attributes copied from the identity provider, the marketplace role, and
//! creation/modification timestamps.
//!
//! Profiles serialize to camelCase JSON with RFC 3339 timestamps, which is
//! the layout used both by the local cache and by the bundled CLI output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::shared::error::SharedError;

/// Marketplace role driving which dashboard and permissions a user receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserRole {
    Learner,
    SkilledProfessional,
    Customer,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [
        UserRole::Learner,
        UserRole::SkilledProfessional,
        UserRole::Customer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Learner => "learner",
            UserRole::SkilledProfessional => "skilled-professional",
            UserRole::Customer => "customer",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserRole::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| SharedError::validation("role", format!("unknown role '{}'", s)))
    }
}

/// Authoritative per-user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Stable identifier assigned by the identity provider
    pub uid: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub display_name: Option<String>,
    /// Absent until the user picks one after sign-up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Create a profile stamped with the current time
    pub fn new(uid: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            uid: uid.into(),
            email: None,
            phone_number: None,
            display_name: None,
            role: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    pub fn with_phone_number(mut self, phone_number: Option<String>) -> Self {
        self.phone_number = phone_number;
        self
    }

    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name;
        self
    }

    pub fn with_role(mut self, role: Option<UserRole>) -> Self {
        self.role = role;
        self
    }

    /// Assign a role and bump `updated_at`
    pub fn assign_role(&mut self, role: UserRole) {
        self.role = Some(role);
        self.touch();
    }

    /// Bump `updated_at` to now
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// A profile without a role must go through role selection
    pub fn needs_role_selection(&self) -> bool {
        self.role.is_none()
    }

    pub fn to_json(&self) -> Result<String, SharedError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, SharedError> {
        Ok(serde_json::from_str(raw)?)
    }
}
