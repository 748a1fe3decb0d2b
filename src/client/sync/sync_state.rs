//! # Session State
//!
//! The in-memory session the reconciler owns and publishes to callers.

use crate::client::sync::resolution::Resolution;
use crate::client::types::Identity;
use crate::shared::UserProfile;

/// Lifecycle of the active session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No identity event processed yet
    #[default]
    Uninitialized,
    Resolving,
    Resolved,
    SignedOut,
}

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub identity: Option<Identity>,
    pub profile: Option<UserProfile>,
    /// Path the last sign-in resolution took
    pub resolution: Option<Resolution>,
    /// Effective offline indicator
    pub is_offline: bool,
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.uid.as_str())
    }

    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }

    /// Signed in with a profile that has no role yet
    pub fn needs_role_selection(&self) -> bool {
        self.profile
            .as_ref()
            .is_some_and(UserProfile::needs_role_selection)
    }

    pub(crate) fn begin_resolving(&mut self, identity: Identity) {
        if self.uid() != Some(identity.uid.as_str()) {
            self.profile = None;
        }
        self.identity = Some(identity);
        self.phase = SessionPhase::Resolving;
        self.loading = true;
    }

    pub(crate) fn resolved(&mut self, profile: UserProfile, resolution: Option<Resolution>) {
        self.profile = Some(profile);
        if resolution.is_some() {
            self.resolution = resolution;
        }
        self.phase = SessionPhase::Resolved;
        self.loading = false;
    }

    pub(crate) fn signed_out(&mut self) {
        self.identity = None;
        self.profile = None;
        self.resolution = None;
        self.phase = SessionPhase::SignedOut;
        self.loading = false;
    }
}
