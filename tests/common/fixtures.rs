//! Reconciler harness and profile fixtures

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use whogofixam::client::{
    Identity, LocalCache, MemoryStore, SessionPhase, SessionReconciler, SessionSnapshot,
};
use whogofixam::shared::{AppConfig, UserProfile, UserRole};

use super::fakes::{FakeIdentityProvider, FakeProfileStore};

pub const TEST_EMAIL: &str = "a@x.com";
pub const TEST_PASSWORD: &str = "pw";
pub const TEST_UID: &str = "user-1";

pub fn test_config() -> AppConfig {
    AppConfig::builder()
        .namespace("whogofixam")
        .api_key("test-key")
        .project_id("test-project")
        .build()
        .unwrap()
}

pub fn test_identity() -> Identity {
    Identity::new(TEST_UID)
        .with_email(TEST_EMAIL)
        .with_display_name("Ada")
}

pub fn profile_with_role(uid: &str, role: Option<UserRole>) -> UserProfile {
    UserProfile::new(uid)
        .with_email(Some(TEST_EMAIL.to_string()))
        .with_display_name(Some("Ada".to_string()))
        .with_role(role)
}

/// Backdate the sync marker of `uid` by `days`
pub async fn age_sync(cache: &LocalCache, uid: &str, days: i64) {
    cache
        .record_sync_at(uid, Utc::now() - ChronoDuration::days(days))
        .await
        .unwrap();
}

/// Reconciler wired to fakes over an in-memory cache
pub struct Harness {
    pub reconciler: SessionReconciler,
    pub identity: Arc<FakeIdentityProvider>,
    pub store: Arc<FakeProfileStore>,
    pub storage: Arc<MemoryStore>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_parts(
            FakeIdentityProvider::new().with_account(TEST_EMAIL, TEST_PASSWORD, TEST_UID),
            FakeProfileStore::new(),
            Arc::new(MemoryStore::new()),
        )
        .await
    }

    pub async fn with_store(store: FakeProfileStore) -> Self {
        Self::with_parts(
            FakeIdentityProvider::new().with_account(TEST_EMAIL, TEST_PASSWORD, TEST_UID),
            store,
            Arc::new(MemoryStore::new()),
        )
        .await
    }

    pub async fn with_parts(
        identity: FakeIdentityProvider,
        store: FakeProfileStore,
        storage: Arc<MemoryStore>,
    ) -> Self {
        let identity = Arc::new(identity);
        let store = Arc::new(store);
        let reconciler = SessionReconciler::new(
            identity.clone(),
            store.clone(),
            storage.clone(),
            &test_config(),
        )
        .await
        .unwrap();
        Self {
            reconciler,
            identity,
            store,
            storage,
        }
    }

    pub fn cache(&self) -> &LocalCache {
        self.reconciler.cache()
    }

    /// Cache a role-bearing profile for the test user
    pub async fn seed_cache(&self, role: Option<UserRole>) -> UserProfile {
        let profile = profile_with_role(TEST_UID, role);
        self.cache().put(&profile).await;
        profile
    }

    /// Wait until the published session reaches `phase`
    pub async fn wait_for_phase(&self, phase: SessionPhase) -> SessionSnapshot {
        let mut session = self.reconciler.subscribe();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(60),
            session.wait_for(|snapshot| snapshot.phase == phase),
        )
        .await
        .expect("session did not reach the expected phase")
        .expect("session channel closed");
        snapshot.clone()
    }
}
