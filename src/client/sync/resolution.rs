//! Profile resolution decision table
//!
//! [`plan`] picks the first matching path for a sign-in from the cache state
//! and the effective offline flag, without touching any storage. The
//! reconciler executes the plan and records the [`Resolution`] it reached.

use chrono::Utc;
use std::fmt;

use crate::client::types::Identity;
use crate::shared::{UserProfile, UserRole};

/// Where a fallback profile came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackSource {
    /// The cached entry, with or without a role
    Cache,
    /// Synthesized from identity provider data
    BasicProfile,
}

/// Path a sign-in resolution ended on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Cached profile with a role, optionally refreshed in the background
    CacheHit { background_refresh: bool },
    /// Offline with no role-bearing cache entry
    OfflineFallback { source: FallbackSource },
    /// Profile read from the remote store
    RemoteFetch,
    /// Online, but the remote store has no document for the uid
    NotFoundFallback { source: FallbackSource },
    /// Remote fetch exhausted its retries
    ErrorFallback { source: FallbackSource },
}

impl Resolution {
    pub fn name(&self) -> &'static str {
        match self {
            Resolution::CacheHit { .. } => "cache_hit",
            Resolution::OfflineFallback { .. } => "offline_fallback",
            Resolution::RemoteFetch => "remote_fetch",
            Resolution::NotFoundFallback { .. } => "not_found_fallback",
            Resolution::ErrorFallback { .. } => "error_fallback",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::CacheHit { background_refresh } if *background_refresh => {
                write!(f, "cache_hit (refreshing)")
            }
            Resolution::OfflineFallback { source }
            | Resolution::NotFoundFallback { source }
            | Resolution::ErrorFallback { source } => {
                write!(f, "{} ({:?})", self.name(), source)
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// First step of a resolution, decided from local state only
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Present the cached profile; `refresh` starts a background fetch
    UseCache { profile: UserProfile, refresh: bool },
    /// Offline: present the cache entry or a basic profile
    Offline { cached: Option<UserProfile> },
    /// Online: read the remote store, keeping the cache entry as fallback
    Fetch { cached: Option<UserProfile> },
}

/// Decide the first resolution step
///
/// A cache entry counts as a hit only when it carries a role. A stale hit is
/// refreshed in the background only while online.
pub fn plan(cached: Option<UserProfile>, fresh: bool, offline: bool) -> Plan {
    match cached {
        Some(profile) if profile.role.is_some() => Plan::UseCache {
            refresh: !fresh && !offline,
            profile,
        },
        cached if offline => Plan::Offline { cached },
        cached => Plan::Fetch { cached },
    }
}

/// Profile built from identity provider data alone
pub fn basic_profile(identity: &Identity, preserved_role: Option<UserRole>) -> UserProfile {
    let now = Utc::now();
    UserProfile {
        uid: identity.uid.clone(),
        email: identity.email.clone(),
        phone_number: identity.phone_number.clone(),
        display_name: identity.display_name.clone(),
        role: preserved_role,
        created_at: now,
        updated_at: now,
    }
}

/// The cached entry if there is one, otherwise a basic profile
pub fn fallback(cached: Option<UserProfile>, identity: &Identity) -> (UserProfile, FallbackSource) {
    match cached {
        Some(profile) => (profile, FallbackSource::Cache),
        None => (basic_profile(identity, None), FallbackSource::BasicProfile),
    }
}
