//! # Local Profile Cache
//!
//! Offline-first profile storage layered over a [`KeyValueStore`].
//!
//! ## Layout
//!
//! Every entry lives under a namespaced string key built by [`CacheKeys`]:
//!
//! | key                               | value                              |
//! |-----------------------------------|------------------------------------|
//! | `{ns}_user_profile_{uid}`         | JSON profile, RFC 3339 dates       |
//! | `{ns}_last_sync_{uid}`            | epoch milliseconds                 |
//! | `{ns}_user_exists_{uid}`          | `"true"` once confirmed remotely   |
//! | `{ns}_pending_write_{uid}`        | JSON [`PendingWrite`]              |
//! | `{ns}_cache_version`              | cache format version               |
//! | `{ns}_offline_mode`               | present while offline is forced    |
//!
//! ## Failure handling
//!
//! Storage failures are logged and degrade to a miss or a no-op. A profile
//! entry that no longer deserializes is deleted and reported as absent.
//! Only [`LocalCache::initialize`] and [`LocalCache::clear_all`] propagate
//! errors, since a cache that cannot be migrated must not be used.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::client::local_db::{KeyValueStore, StorageError};
use crate::client::offline::PendingWrite;
use crate::shared::{AppConfig, UserProfile};

/// One purpose of a cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey<'a> {
    Profile(&'a str),
    LastSync(&'a str),
    UserExists(&'a str),
    PendingWrite(&'a str),
    CacheVersion,
    OfflineMode,
}

/// Builds every key the cache reads or writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    namespace: String,
}

impl CacheKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Prefix shared by every key of this namespace
    pub fn prefix(&self) -> String {
        format!("{}_", self.namespace)
    }

    pub fn build(&self, key: CacheKey<'_>) -> String {
        match key {
            CacheKey::Profile(uid) => format!("{}_user_profile_{}", self.namespace, uid),
            CacheKey::LastSync(uid) => format!("{}_last_sync_{}", self.namespace, uid),
            CacheKey::UserExists(uid) => format!("{}_user_exists_{}", self.namespace, uid),
            CacheKey::PendingWrite(uid) => format!("{}_pending_write_{}", self.namespace, uid),
            CacheKey::CacheVersion => format!("{}_cache_version", self.namespace),
            CacheKey::OfflineMode => format!("{}_offline_mode", self.namespace),
        }
    }
}

/// Persistent, possibly stale copy of user profiles
#[derive(Debug, Clone)]
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
    keys: CacheKeys,
    version: String,
    freshness: chrono::Duration,
}

impl LocalCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &AppConfig) -> Self {
        Self {
            store,
            keys: CacheKeys::new(config.namespace.clone()),
            version: config.cache_version.clone(),
            freshness: config.freshness_window(),
        }
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    /// Version check; must run before any other cache operation
    ///
    /// Returns `true` when the stored version differed and every entry of
    /// the namespace was cleared.
    pub async fn initialize(&self) -> Result<bool, StorageError> {
        let version_key = self.keys.build(CacheKey::CacheVersion);
        let stored = self.store.get(&version_key).await?;
        if stored.as_deref() == Some(self.version.as_str()) {
            return Ok(false);
        }

        tracing::info!(
            stored = stored.as_deref().unwrap_or("none"),
            current = %self.version,
            "cache version changed, clearing local cache"
        );
        self.clear_all().await?;
        self.store.set(&version_key, &self.version).await?;
        Ok(true)
    }

    /// Cached profile for `uid`, if one exists and still deserializes
    pub async fn get(&self, uid: &str) -> Option<UserProfile> {
        let key = self.keys.build(CacheKey::Profile(uid));
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(uid, "no cached profile");
                return None;
            }
            Err(e) => {
                tracing::warn!(uid, error = %e, "failed to read cached profile");
                return None;
            }
        };

        match UserProfile::from_json(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(uid, error = %e, "discarding corrupt cached profile");
                if let Err(e) = self.store.remove(&key).await {
                    tracing::warn!(uid, error = %e, "failed to remove corrupt cached profile");
                }
                None
            }
        }
    }

    /// Store `profile`, stamp the sync time and mark it as known remotely
    pub async fn put(&self, profile: &UserProfile) {
        let uid = profile.uid.as_str();
        let raw = match profile.to_json() {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(uid, error = %e, "failed to serialize profile for cache");
                return;
            }
        };

        let result = async {
            self.store
                .set(&self.keys.build(CacheKey::Profile(uid)), &raw)
                .await?;
            self.record_sync_at(uid, Utc::now()).await?;
            self.store
                .set(&self.keys.build(CacheKey::UserExists(uid)), "true")
                .await
        }
        .await;

        match result {
            Ok(()) => tracing::debug!(uid, "profile cached"),
            Err(e) => tracing::warn!(uid, error = %e, "failed to cache profile"),
        }
    }

    /// Stamp the sync marker at `at`
    pub async fn record_sync_at(&self, uid: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.store
            .set(
                &self.keys.build(CacheKey::LastSync(uid)),
                &at.timestamp_millis().to_string(),
            )
            .await
    }

    /// Stamp the sync marker now, after a successful remote write
    pub async fn touch_sync(&self, uid: &str) {
        if let Err(e) = self.record_sync_at(uid, Utc::now()).await {
            tracing::warn!(uid, error = %e, "failed to stamp sync time");
        }
    }

    pub async fn last_sync(&self, uid: &str) -> Option<DateTime<Utc>> {
        let raw = match self.store.get(&self.keys.build(CacheKey::LastSync(uid))).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(uid, error = %e, "failed to read sync time");
                return None;
            }
        };
        raw.trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    pub async fn is_fresh(&self, uid: &str) -> bool {
        self.is_fresh_at(uid, Utc::now()).await
    }

    /// Whether the last sync happened less than the freshness window before `now`
    pub async fn is_fresh_at(&self, uid: &str, now: DateTime<Utc>) -> bool {
        match self.last_sync(uid).await {
            Some(synced) => now.signed_duration_since(synced) < self.freshness,
            None => false,
        }
    }

    /// Forget the sync time only; profile and existence flag stay for offline login
    pub async fn clear_session(&self, uid: &str) {
        if let Err(e) = self.store.remove(&self.keys.build(CacheKey::LastSync(uid))).await {
            tracing::warn!(uid, error = %e, "failed to clear session sync time");
        }
    }

    /// Remove every entry of the namespace
    pub async fn clear_all(&self) -> Result<(), StorageError> {
        let keys = self.store.keys_with_prefix(&self.keys.prefix()).await?;
        for key in &keys {
            self.store.remove(key).await?;
        }
        tracing::info!(removed = keys.len(), "local cache cleared");
        Ok(())
    }

    pub async fn exists_remotely(&self, uid: &str) -> bool {
        matches!(
            self.store.get(&self.keys.build(CacheKey::UserExists(uid))).await,
            Ok(Some(flag)) if flag == "true"
        )
    }

    /// Persisted forced-offline flag
    pub async fn offline_override(&self) -> bool {
        match self.store.get(&self.keys.build(CacheKey::OfflineMode)).await {
            Ok(flag) => flag.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read offline override");
                false
            }
        }
    }

    pub async fn set_offline_override(&self, offline: bool) {
        let key = self.keys.build(CacheKey::OfflineMode);
        let result = if offline {
            self.store.set(&key, "true").await
        } else {
            self.store.remove(&key).await
        };
        if let Err(e) = result {
            tracing::warn!(offline, error = %e, "failed to persist offline override");
        }
    }

    pub async fn pending_write(&self, uid: &str) -> Option<PendingWrite> {
        let key = self.keys.build(CacheKey::PendingWrite(uid));
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(uid, error = %e, "failed to read pending write");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(pending) => Some(pending),
            Err(e) => {
                tracing::warn!(uid, error = %e, "discarding corrupt pending write");
                if let Err(e) = self.store.remove(&key).await {
                    tracing::warn!(uid, error = %e, "failed to remove corrupt pending write");
                }
                None
            }
        }
    }

    pub async fn set_pending_write(&self, uid: &str, pending: &PendingWrite) {
        let key = self.keys.build(CacheKey::PendingWrite(uid));
        let result = match serde_json::to_string(pending) {
            Ok(raw) => self.store.set(&key, &raw).await,
            Err(e) => {
                tracing::warn!(uid, error = %e, "failed to serialize pending write");
                return;
            }
        };
        if let Err(e) = result {
            tracing::warn!(uid, error = %e, "failed to persist pending write");
        }
    }

    pub async fn clear_pending_write(&self, uid: &str) {
        if let Err(e) = self.store.remove(&self.keys.build(CacheKey::PendingWrite(uid))).await {
            tracing::warn!(uid, error = %e, "failed to clear pending write");
        }
    }
}
