//! Session reconciler tests
//!
//! Resolution paths, retry behavior and the cache lifecycle, driven through
//! the fake identity provider and profile store.

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use whogofixam::client::{
    CacheKey, FallbackSource, KeyValueStore, MemoryStore, Resolution, SessionPhase, StoreError,
};
use whogofixam::shared::UserRole;

use crate::common::*;

#[tokio::test]
async fn test_sign_out_preserves_offline_login() {
    let store = FakeProfileStore::new()
        .with_document(profile_with_role(TEST_UID, Some(UserRole::Learner)));
    let harness = Harness::with_store(store).await;
    let _listener = harness.reconciler.listen();

    crate::assert_ok!(harness.reconciler.login(TEST_EMAIL, TEST_PASSWORD).await);
    let snapshot = harness.wait_for_phase(SessionPhase::Resolved).await;
    assert_eq!(snapshot.resolution, Some(Resolution::RemoteFetch));
    assert!(harness.cache().is_fresh(TEST_UID).await);

    crate::assert_ok!(harness.reconciler.logout().await);

    let cached = harness.cache().get(TEST_UID).await.expect("profile kept");
    assert_eq!(cached.role, Some(UserRole::Learner));
    assert!(harness.cache().exists_remotely(TEST_UID).await);
    assert!(harness.cache().last_sync(TEST_UID).await.is_none());
    assert!(harness.reconciler.current_profile().is_none());
    assert_eq!(harness.reconciler.snapshot().phase, SessionPhase::SignedOut);
}

#[tokio::test]
async fn test_forced_offline_uses_cache_without_fetch() {
    let harness = Harness::new().await;
    let cached = harness.seed_cache(Some(UserRole::Learner)).await;
    age_sync(harness.cache(), TEST_UID, 45).await;
    harness.reconciler.offline_mode().set_offline(true).await;

    let resolution = harness.reconciler.resolve(test_identity()).await;

    assert_eq!(
        resolution,
        Resolution::CacheHit {
            background_refresh: false
        }
    );
    assert_eq!(harness.reconciler.current_profile(), Some(cached));
    harness.reconciler.wait_for_background().await;
    assert_eq!(harness.store.reads(), 0);
}

#[tokio::test]
async fn test_offline_presents_roleless_cache_entry() {
    let harness = Harness::new().await;
    harness.seed_cache(None).await;
    harness.reconciler.offline_mode().set_network_online(false);

    let resolution = harness.reconciler.resolve(test_identity()).await;

    assert_eq!(
        resolution,
        Resolution::OfflineFallback {
            source: FallbackSource::Cache
        }
    );
    assert!(harness.reconciler.snapshot().needs_role_selection());
    assert_eq!(harness.store.reads(), 0);
}

#[tokio::test]
async fn test_new_user_not_in_store_gets_basic_profile() {
    let harness = Harness::new().await;

    let resolution = harness.reconciler.resolve(test_identity()).await;

    assert_eq!(
        resolution,
        Resolution::NotFoundFallback {
            source: FallbackSource::BasicProfile
        }
    );
    let profile = harness.reconciler.current_profile().unwrap();
    assert_eq!(profile.role, None);
    assert_eq!(profile.email.as_deref(), Some(TEST_EMAIL));
    assert_eq!(profile.display_name.as_deref(), Some("Ada"));
    assert!(harness.cache().get(TEST_UID).await.is_none());
    assert!(!harness.reconciler.is_offline());
}

#[tokio::test]
async fn test_previously_cached_role_is_preserved() {
    let harness = Harness::new().await;
    harness.seed_cache(Some(UserRole::SkilledProfessional)).await;

    harness.reconciler.resolve(test_identity()).await;

    crate::assert_presented_role!(harness.reconciler, Some(UserRole::SkilledProfessional));
}

#[tokio::test(start_paused = true)]
async fn test_two_timeouts_then_success() {
    let remote = profile_with_role(TEST_UID, Some(UserRole::Customer));
    let store = FakeProfileStore::new().with_document(remote.clone());
    store.script([ReadStep::Hang, ReadStep::Hang]);
    let harness = Harness::with_store(store).await;
    let started = tokio::time::Instant::now();

    let resolution = harness.reconciler.resolve(test_identity()).await;

    assert_eq!(resolution, Resolution::RemoteFetch);
    assert_eq!(harness.store.reads(), 3);
    // two 10s timeouts, then 2s and 4s of backoff
    assert!(started.elapsed() >= Duration::from_secs(26));
    assert_eq!(harness.reconciler.current_profile(), Some(remote.clone()));
    assert_eq!(harness.cache().get(TEST_UID).await, Some(remote));
    assert!(!harness.reconciler.is_offline());
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_falls_back_to_cache() {
    let store = FakeProfileStore::new();
    store.script(vec![ReadStep::Fail(StoreError::Unavailable("down".to_string())); 3]);
    let harness = Harness::with_store(store).await;
    let cached = harness.seed_cache(None).await;

    let resolution = harness.reconciler.resolve(test_identity()).await;

    assert_eq!(
        resolution,
        Resolution::ErrorFallback {
            source: FallbackSource::Cache
        }
    );
    assert_eq!(harness.store.reads(), 3);
    assert_eq!(harness.reconciler.current_profile(), Some(cached));
    assert!(harness.reconciler.is_offline());
    assert!(harness.reconciler.snapshot().is_offline);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_without_cache_synthesizes_profile() {
    let store = FakeProfileStore::new();
    store.script([ReadStep::Hang, ReadStep::Hang, ReadStep::Hang]);
    let harness = Harness::with_store(store).await;

    let resolution = harness.reconciler.resolve(test_identity()).await;

    assert_eq!(
        resolution,
        Resolution::ErrorFallback {
            source: FallbackSource::BasicProfile
        }
    );
    assert!(harness.reconciler.snapshot().needs_role_selection());
    assert!(harness.reconciler.is_offline());
}

#[tokio::test]
async fn test_cache_version_bump_clears_everything_first() {
    let storage = Arc::new(MemoryStore::new());
    storage.set("whogofixam_cache_version", "2.0").await.unwrap();
    storage
        .set(
            "whogofixam_user_profile_user-1",
            &profile_with_role(TEST_UID, Some(UserRole::Learner))
                .to_json()
                .unwrap(),
        )
        .await
        .unwrap();
    storage.set("whogofixam_offline_mode", "true").await.unwrap();
    storage.set("other_app_key", "kept").await.unwrap();

    let harness =
        Harness::with_parts(FakeIdentityProvider::new(), FakeProfileStore::new(), storage.clone())
            .await;

    let remaining = storage.keys_with_prefix("whogofixam_").await.unwrap();
    assert_eq!(remaining, vec!["whogofixam_cache_version".to_string()]);
    assert_eq!(
        storage.get("whogofixam_cache_version").await.unwrap().as_deref(),
        Some("3.0")
    );
    assert_eq!(storage.get("other_app_key").await.unwrap().as_deref(), Some("kept"));
    assert!(harness.cache().get(TEST_UID).await.is_none());
    assert!(!harness.reconciler.is_offline());
}

#[tokio::test]
async fn test_forced_offline_survives_restart() {
    let storage = Arc::new(MemoryStore::new());
    let first =
        Harness::with_parts(FakeIdentityProvider::new(), FakeProfileStore::new(), storage.clone())
            .await;
    first.reconciler.offline_mode().set_offline(true).await;

    let second =
        Harness::with_parts(FakeIdentityProvider::new(), FakeProfileStore::new(), storage).await;

    assert!(second.reconciler.is_offline());
    assert!(second.reconciler.snapshot().is_offline);
}

#[tokio::test]
async fn test_signed_out_startup_clears_saved_offline_flag() {
    let storage = Arc::new(MemoryStore::new());
    let first =
        Harness::with_parts(FakeIdentityProvider::new(), FakeProfileStore::new(), storage.clone())
            .await;
    first.reconciler.offline_mode().set_offline(true).await;

    let second = Harness::with_parts(
        FakeIdentityProvider::new().with_account(TEST_EMAIL, TEST_PASSWORD, TEST_UID),
        FakeProfileStore::new()
            .with_document(profile_with_role(TEST_UID, Some(UserRole::Customer))),
        storage,
    )
    .await;
    assert!(second.reconciler.is_offline());

    let mut session = second.reconciler.subscribe();
    let _listener = second.reconciler.listen();
    tokio::time::timeout(
        Duration::from_secs(5),
        session.wait_for(|snapshot| !snapshot.is_offline),
    )
    .await
    .expect("startup sign-out did not clear offline mode")
    .expect("session channel closed");

    crate::assert_ok!(second.reconciler.login(TEST_EMAIL, TEST_PASSWORD).await);
    let snapshot = second.wait_for_phase(SessionPhase::Resolved).await;

    assert_eq!(snapshot.resolution, Some(Resolution::RemoteFetch));
    assert_eq!(second.store.reads(), 1);
    crate::assert_presented_role!(second.reconciler, Some(UserRole::Customer));
}

#[tokio::test]
async fn test_manual_refresh_revalidates_in_background() {
    let store = FakeProfileStore::new().with_document(
        profile_with_role(TEST_UID, Some(UserRole::Learner)).with_display_name(Some("Ada L.".to_string())),
    );
    let harness = Harness::with_store(store).await;
    harness.seed_cache(Some(UserRole::Learner)).await;
    harness.reconciler.resolve(test_identity()).await;

    let resolution = harness.reconciler.refresh_profile().await;

    assert_eq!(
        resolution,
        Some(Resolution::CacheHit {
            background_refresh: true
        })
    );
    harness.reconciler.wait_for_background().await;
    let profile = harness.reconciler.current_profile().unwrap();
    assert_eq!(profile.display_name.as_deref(), Some("Ada L."));
    assert!(harness.cache().is_fresh(TEST_UID).await);
}

#[tokio::test]
async fn test_refresh_without_session_is_noop() {
    let harness = Harness::new().await;
    assert_eq!(harness.reconciler.refresh_profile().await, None);
    assert_eq!(harness.reconciler.retry_connection().await, None);
}

#[tokio::test]
async fn test_corrupt_cache_entry_is_a_miss() {
    let harness = Harness::new().await;
    let key = harness.cache().keys().build(CacheKey::Profile(TEST_UID));
    harness.storage.set(&key, "{\"uid\":").await.unwrap();
    harness.reconciler.offline_mode().set_offline(true).await;

    let resolution = harness.reconciler.resolve(test_identity()).await;

    assert_matches!(
        resolution,
        Resolution::OfflineFallback {
            source: FallbackSource::BasicProfile
        }
    );
    assert!(harness.storage.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_credential_errors_reach_the_caller() {
    let harness = Harness::new().await;

    let error = harness
        .reconciler
        .login(TEST_EMAIL, "wrong")
        .await
        .unwrap_err();
    assert_eq!(error.credential_code(), Some("INVALID_PASSWORD"));

    let error = harness
        .reconciler
        .signup(TEST_EMAIL, "pw", "Ada", UserRole::Learner)
        .await
        .unwrap_err();
    assert_eq!(error.credential_code(), Some("EMAIL_EXISTS"));
    assert!(!harness.reconciler.is_offline());
}

#[tokio::test]
async fn test_unavailable_provider_turns_offline() {
    let harness = Harness::new().await;
    harness.identity.set_unavailable(true);

    let error = harness
        .reconciler
        .login(TEST_EMAIL, TEST_PASSWORD)
        .await
        .unwrap_err();

    assert_eq!(error.credential_code(), None);
    assert!(harness.reconciler.is_offline());
}

#[tokio::test]
async fn test_phone_verification_signs_in() {
    let harness = Harness::new().await;
    let _listener = harness.reconciler.listen();

    let error = harness
        .reconciler
        .send_phone_verification("0801234", "challenge")
        .await
        .unwrap_err();
    assert_eq!(error.credential_code(), Some("INVALID_PHONE_NUMBER"));

    let confirmation = crate::assert_ok!(
        harness
            .reconciler
            .send_phone_verification("+234801234", "challenge")
            .await
    );
    let error = harness
        .reconciler
        .confirm_phone(&confirmation, "000000")
        .await
        .unwrap_err();
    assert_eq!(error.credential_code(), Some("INVALID_CODE"));

    let identity = crate::assert_ok!(
        harness
            .reconciler
            .confirm_phone(&confirmation, VALID_CODE)
            .await
    );
    let snapshot = harness.wait_for_phase(SessionPhase::Resolved).await;
    let profile = snapshot.profile.unwrap();
    assert_eq!(profile.uid, identity.uid);
    assert_eq!(profile.phone_number.as_deref(), Some("+234801234"));
    assert!(profile.needs_role_selection());
}
