//! # Session Reconciler
//!
//! Decides which profile to present for the signed-in identity, given the
//! local cache, the offline state and the answers of the remote profile
//! store, and writes results back to either side.
//!
//! ## Architecture
//!
//! - **Resolution**: `resolution.rs` holds the decision table; this module
//!   executes it
//! - **Session State**: `sync_state.rs` holds the published snapshot
//! - **Network Monitor**: `network_monitor.rs` turns connectivity events into
//!   offline flag changes and reconnects
//!
//! ## Ordering
//!
//! Identity events are processed one at a time by the [`listen`] task, in the
//! order the provider emitted them. Every transition (resolution start,
//! sign-up, role assignment, sign-out) advances a session generation while
//! holding the state lock. A resolution or background refresh applies its
//! result only if its generation is still the newest and the uid still
//! matches, so a slow fetch can never overwrite a newer session.
//!
//! ## Background work
//!
//! Stale-cache refreshes and remote writes run as spawned tasks. A write that
//! fails while the store is unreachable is kept as a [`PendingWrite`] in the
//! cache and delivered before the next remote read of that uid. A write the
//! store rejects outright is dropped; it never blocks the read. A role update
//! for a document that does not exist yet is sent as a full document built
//! from the cached profile.
//!
//! [`listen`]: SessionReconciler::listen
//!
//! ## Usage
//!
//! ```rust,ignore
//! use whogofixam::client::sync::SessionReconciler;
//!
//! let reconciler = SessionReconciler::new(identity, store, kv, &config).await?;
//! let _listener = reconciler.listen();
//!
//! reconciler.login("a@x.com", "pw").await?;
//! let mut session = reconciler.subscribe();
//! session.changed().await?;
//! println!("{:?}", session.borrow().profile);
//! ```

pub mod network_monitor;
pub mod resolution;
pub mod sync_state;

pub use network_monitor::{ConnectivityEvent, NetworkMonitor, NetworkStatus};
pub use resolution::{FallbackSource, Plan, Resolution};
pub use sync_state::{SessionPhase, SessionSnapshot};

use futures_util::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock, RwLockWriteGuard};
use tokio::task::JoinHandle;

use crate::client::auth::{AuthError, IdentityProvider, PhoneConfirmation};
use crate::client::cache::LocalCache;
use crate::client::error::SessionError;
use crate::client::local_db::KeyValueStore;
use crate::client::offline::{
    retry_while, retry_with_timeout, AttemptError, OfflineMode, PendingWrite, RetryPolicy,
};
use crate::client::remote::{ProfileStore, ProfileUpdate, StoreError};
use crate::client::types::Identity;
use crate::shared::{AppConfig, UserProfile, UserRole};

type FetchError = AttemptError<StoreError>;

/// Session and profile reconciliation layer
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionReconciler {
    inner: Arc<Inner>,
}

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn ProfileStore>,
    cache: LocalCache,
    offline: OfflineMode,
    foreground: RetryPolicy,
    background: RetryPolicy,
    state: RwLock<SessionSnapshot>,
    generation: AtomicU64,
    snapshots: watch::Sender<SessionSnapshot>,
    /// Serializes delivery of remote writes per process
    writes: Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionReconciler")
            .field("generation", &self.inner.generation.load(Ordering::SeqCst))
            .field("offline", &self.inner.offline.is_offline())
            .finish_non_exhaustive()
    }
}

impl SessionReconciler {
    /// Build the reconciler; migrates the cache before anything reads it
    pub async fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn ProfileStore>,
        storage: Arc<dyn KeyValueStore>,
        config: &AppConfig,
    ) -> Result<Self, SessionError> {
        let cache = LocalCache::new(storage, config);
        if cache.initialize().await? {
            tracing::info!(version = %config.cache_version, "local cache migrated");
        }
        let offline = OfflineMode::load(cache.clone()).await;

        let initial = SessionSnapshot {
            is_offline: offline.is_offline(),
            ..SessionSnapshot::default()
        };
        let (snapshots, _) = watch::channel(initial.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                identity,
                store,
                cache,
                offline,
                foreground: RetryPolicy::foreground(config),
                background: RetryPolicy::background(config),
                state: RwLock::new(initial),
                generation: AtomicU64::new(0),
                snapshots,
                writes: Mutex::new(()),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn cache(&self) -> &LocalCache {
        &self.inner.cache
    }

    pub fn offline_mode(&self) -> &OfflineMode {
        &self.inner.offline
    }

    pub fn is_offline(&self) -> bool {
        self.inner.offline.is_offline()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn current_profile(&self) -> Option<UserProfile> {
        self.inner.snapshots.borrow().profile.clone()
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.inner.snapshots.borrow().identity.clone()
    }

    /// Process identity changes in emission order, starting with the current one
    pub fn listen(&self) -> JoinHandle<()> {
        let reconciler = self.clone();
        let mut events = self.inner.identity.subscribe();
        tokio::spawn(async move {
            loop {
                let identity = events.borrow_and_update().clone();
                reconciler.handle_identity_change(identity).await;
                if events.changed().await.is_err() {
                    tracing::debug!("identity provider closed its event stream");
                    break;
                }
            }
        })
    }

    pub async fn handle_identity_change(&self, identity: Option<Identity>) {
        match identity {
            Some(identity) => {
                tracing::info!(uid = %identity.uid, "identity changed: signed in");
                self.resolve(identity).await;
            }
            None => self.apply_sign_out().await,
        }
    }

    /// Run the sign-in resolution for `identity`
    pub async fn resolve(&self, identity: Identity) -> Resolution {
        let uid = identity.uid.clone();
        let (generation, cached, fresh) = {
            let mut state = self.inner.state.write().await;
            let generation = self.advance();
            state.begin_resolving(identity.clone());
            self.publish(&state);
            // Read under the lock so a concurrent sign-up's cache write is
            // either fully visible or ordered after this generation.
            let cached = self.inner.cache.get(&uid).await;
            let fresh = self.inner.cache.is_fresh(&uid).await;
            (generation, cached, fresh)
        };

        let offline = self.inner.offline.is_offline();
        let resolution = match resolution::plan(cached, fresh, offline) {
            Plan::UseCache { profile, refresh } => {
                let resolution = Resolution::CacheHit {
                    background_refresh: refresh,
                };
                self.apply(generation, &uid, profile, Some(resolution), false)
                    .await;
                if refresh {
                    tracing::info!(uid, "cached profile is stale, refreshing in background");
                    self.spawn_refresh(generation, uid.clone()).await;
                }
                resolution
            }
            Plan::Offline { cached } => {
                let (profile, source) = resolution::fallback(cached, &identity);
                let resolution = Resolution::OfflineFallback { source };
                self.apply_fallback(generation, &uid, profile, source, resolution)
                    .await;
                resolution
            }
            Plan::Fetch { cached } => {
                match self.fetch_remote(&uid, &self.inner.foreground).await {
                    Ok(Some(profile)) => {
                        self.inner.offline.set_offline(false).await;
                        self.apply(generation, &uid, profile, Some(Resolution::RemoteFetch), true)
                            .await;
                        Resolution::RemoteFetch
                    }
                    Ok(None) => {
                        tracing::info!(uid, "no profile document, falling back");
                        let (profile, source) = resolution::fallback(cached, &identity);
                        let resolution = Resolution::NotFoundFallback { source };
                        self.apply_fallback(generation, &uid, profile, source, resolution)
                            .await;
                        resolution
                    }
                    Err(e) => {
                        tracing::warn!(uid, error = %e, "profile fetch failed, going offline");
                        self.inner.offline.set_offline(true).await;
                        let (profile, source) = resolution::fallback(cached, &identity);
                        let resolution = Resolution::ErrorFallback { source };
                        self.apply_fallback(generation, &uid, profile, source, resolution)
                            .await;
                        resolution
                    }
                }
            }
        };

        tracing::info!(uid, path = %resolution, "profile resolved");
        resolution
    }

    /// Create an account and present its profile before the network confirms it
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        role: UserRole,
    ) -> Result<UserProfile, SessionError> {
        let identity = match self.inner.identity.create_account(email, password).await {
            Ok(identity) => identity,
            Err(e) => return Err(self.credential_failure(e).await),
        };

        let renamed = self
            .inner
            .identity
            .set_display_name(&identity, display_name)
            .await;
        let identity = match renamed {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(uid = %identity.uid, error = %e, "failed to set display name");
                if e.is_unavailable() {
                    self.inner.offline.set_offline(true).await;
                }
                identity.with_display_name(display_name)
            }
        };

        let profile = UserProfile::new(identity.uid.clone())
            .with_email(identity.email.clone())
            .with_phone_number(identity.phone_number.clone())
            .with_display_name(Some(display_name.to_string()))
            .with_role(Some(role));

        {
            let mut state = self.inner.state.write().await;
            self.advance();
            state.identity = Some(identity);
            state.resolved(profile.clone(), None);
            self.inner.cache.put(&profile).await;
            self.publish(&state);
        }
        tracing::info!(uid = %profile.uid, role = %role, "account created, profile cached");

        self.spawn_write(
            profile.uid.clone(),
            PendingWrite::Replace {
                profile: profile.clone(),
            },
        )
        .await;
        Ok(profile)
    }

    /// Sign in with email and password; the profile follows from the identity event
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        match self.inner.identity.sign_in(email, password).await {
            Ok(identity) => Ok(identity),
            Err(e) => Err(self.credential_failure(e).await),
        }
    }

    pub async fn send_phone_verification(
        &self,
        phone_number: &str,
        challenge: &str,
    ) -> Result<PhoneConfirmation, SessionError> {
        match self
            .inner
            .identity
            .send_phone_verification(phone_number, challenge)
            .await
        {
            Ok(confirmation) => Ok(confirmation),
            Err(e) => Err(self.credential_failure(e).await),
        }
    }

    pub async fn confirm_phone(
        &self,
        confirmation: &PhoneConfirmation,
        code: &str,
    ) -> Result<Identity, SessionError> {
        match self.inner.identity.confirm_phone(confirmation, code).await {
            Ok(identity) => Ok(identity),
            Err(e) => Err(self.credential_failure(e).await),
        }
    }

    /// Sign out, keeping the cached profile for a later offline login
    pub async fn logout(&self) -> Result<(), SessionError> {
        if let Some(identity) = self.current_identity() {
            self.inner.cache.clear_session(&identity.uid).await;
        }
        self.inner.identity.sign_out().await?;
        self.apply_sign_out().await;
        Ok(())
    }

    /// Assign a role locally now and remotely in the background
    pub async fn set_role(&self, role: UserRole) -> Result<UserProfile, SessionError> {
        let profile = {
            let mut state = self.inner.state.write().await;
            let identity = state.identity.clone().ok_or(SessionError::NotSignedIn)?;
            self.advance();

            let mut profile = state
                .profile
                .clone()
                .unwrap_or_else(|| resolution::basic_profile(&identity, None));
            profile.assign_role(role);

            state.resolved(profile.clone(), None);
            self.inner.cache.put(&profile).await;
            self.publish(&state);
            profile
        };
        tracing::info!(uid = %profile.uid, role = %role, "role assigned");

        let update = ProfileUpdate {
            role: Some(role),
            display_name: None,
            updated_at: profile.updated_at,
        };
        self.spawn_write(profile.uid.clone(), PendingWrite::Update { update })
            .await;
        Ok(profile)
    }

    /// Forget the sync time of the current user and resolve again
    pub async fn refresh_profile(&self) -> Option<Resolution> {
        let identity = self.current_identity()?;
        self.inner.cache.clear_session(&identity.uid).await;
        Some(self.resolve(identity).await)
    }

    /// Re-enable the remote store, leave offline mode and resolve again
    pub async fn retry_connection(&self) -> Option<Resolution> {
        if let Err(e) = self.inner.store.enable_network().await {
            tracing::warn!(error = %e, "failed to re-enable remote store");
            self.inner.offline.set_offline(true).await;
            self.publish_current().await;
            return None;
        }
        self.inner.offline.set_offline(false).await;
        self.publish_current().await;
        tracing::info!("connection restored");

        let identity = self.current_identity()?;
        self.flush_pending(&identity.uid, &self.inner.foreground).await;
        Some(self.resolve(identity).await)
    }

    /// Wait for every background refresh and write started so far
    pub async fn wait_for_background(&self) {
        loop {
            let handles = std::mem::take(&mut *self.inner.tasks.lock().await);
            if handles.is_empty() {
                return;
            }
            for result in join_all(handles).await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "background task failed");
                }
            }
        }
    }

    /// Republish the snapshot, e.g. after an offline flag change
    pub async fn publish_current(&self) {
        let state = self.inner.state.read().await;
        self.publish(&state);
    }

    fn advance(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    fn publish(&self, state: &SessionSnapshot) {
        let mut snapshot = state.clone();
        snapshot.is_offline = self.inner.offline.is_offline();
        self.inner.snapshots.send_replace(snapshot);
    }

    /// Lock the state if `generation` is still the newest for `uid`
    async fn lock_if_current(
        &self,
        generation: u64,
        uid: &str,
    ) -> Option<RwLockWriteGuard<'_, SessionSnapshot>> {
        let state = self.inner.state.write().await;
        if self.is_current(generation) && state.uid() == Some(uid) {
            Some(state)
        } else {
            tracing::debug!(uid, generation, "discarding superseded result");
            None
        }
    }

    async fn apply(
        &self,
        generation: u64,
        uid: &str,
        profile: UserProfile,
        resolution: Option<Resolution>,
        persist: bool,
    ) -> bool {
        let Some(mut state) = self.lock_if_current(generation, uid).await else {
            return false;
        };
        if persist {
            self.inner.cache.put(&profile).await;
        }
        state.resolved(profile, resolution);
        self.publish(&state);
        true
    }

    /// Basic profiles are cached only when they carry a role
    async fn apply_fallback(
        &self,
        generation: u64,
        uid: &str,
        profile: UserProfile,
        source: FallbackSource,
        resolution: Resolution,
    ) -> bool {
        let persist = source == FallbackSource::BasicProfile && profile.role.is_some();
        self.apply(generation, uid, profile, Some(resolution), persist)
            .await
    }

    /// Every signed-out event, including the one at startup, leaves offline mode
    async fn apply_sign_out(&self) {
        let was_signed_in = {
            let mut state = self.inner.state.write().await;
            self.advance();
            let was_signed_in = state.is_signed_in();
            state.signed_out();
            was_signed_in
        };
        if was_signed_in {
            tracing::info!("identity changed: signed out");
        }
        self.inner.offline.set_offline(false).await;
        self.publish_current().await;
    }

    async fn credential_failure(&self, error: AuthError) -> SessionError {
        if error.is_unavailable() {
            tracing::warn!(error = %error, "identity provider unavailable");
            self.inner.offline.set_offline(true).await;
            self.publish_current().await;
        }
        SessionError::from(error)
    }

    /// Try to deliver any pending write, then read the profile document
    ///
    /// A write that is still pending afterwards is laid over the document
    /// read, so the local change is not lost to an older remote copy.
    async fn fetch_remote(
        &self,
        uid: &str,
        policy: &RetryPolicy,
    ) -> Result<Option<UserProfile>, FetchError> {
        let pending = self.flush_pending(uid, policy).await;
        let remote =
            retry_with_timeout(policy, "profile fetch", |_| self.inner.store.read_profile(uid))
                .await?;
        Ok(match (remote, pending) {
            (Some(profile), Some(pending)) => Some(pending.overlay(profile)),
            (remote, _) => remote,
        })
    }

    /// Returns the write if it is still pending afterwards
    async fn flush_pending(&self, uid: &str, policy: &RetryPolicy) -> Option<PendingWrite> {
        let _writes = self.inner.writes.lock().await;
        let pending = self.inner.cache.pending_write(uid).await?;
        let write = &pending;
        let delivered = retry_while(
            policy,
            "pending write",
            |_| self.deliver(uid, write),
            StoreError::is_transient,
        )
        .await;

        match delivered {
            Ok(()) => {
                self.inner.cache.clear_pending_write(uid).await;
                self.inner.cache.touch_sync(uid).await;
                tracing::info!(uid, "pending write delivered");
                None
            }
            Err(AttemptError::Failed(e)) if !e.is_transient() => {
                tracing::warn!(uid, error = %e, "pending write rejected, dropping it");
                self.inner.cache.clear_pending_write(uid).await;
                None
            }
            Err(e) => {
                tracing::warn!(uid, error = %e, "pending write still undeliverable");
                Some(pending)
            }
        }
    }

    async fn deliver(&self, uid: &str, write: &PendingWrite) -> Result<(), StoreError> {
        match write {
            PendingWrite::Replace { profile } => self.inner.store.write_profile(uid, profile).await,
            PendingWrite::Update { update } => {
                match self.inner.store.update_profile(uid, update).await {
                    Err(StoreError::NotFound(message)) => {
                        let Some(mut profile) = self.inner.cache.get(uid).await else {
                            return Err(StoreError::NotFound(message));
                        };
                        update.apply_to(&mut profile);
                        tracing::info!(uid, "no profile document to update, writing it in full");
                        self.inner.store.write_profile(uid, &profile).await
                    }
                    result => result,
                }
            }
        }
    }

    async fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.inner.tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    async fn spawn_refresh(&self, generation: u64, uid: String) {
        let reconciler = self.clone();
        let handle = tokio::spawn(async move {
            let policy = reconciler.inner.background;
            match reconciler.fetch_remote(&uid, &policy).await {
                Ok(Some(profile)) => {
                    if reconciler.apply(generation, &uid, profile, None, true).await {
                        tracing::info!(uid, "profile refreshed in background");
                    }
                }
                Ok(None) => tracing::debug!(uid, "background refresh found no document"),
                Err(e) => tracing::debug!(uid, error = %e, "background refresh failed"),
            }
        });
        self.track(handle).await;
    }

    /// Deliver `write` in the background, merged with any earlier pending one
    async fn spawn_write(&self, uid: String, write: PendingWrite) {
        let reconciler = self.clone();
        let handle = tokio::spawn(async move {
            let inner = &reconciler.inner;
            let guard = inner.writes.lock().await;
            let write = match inner.cache.pending_write(&uid).await {
                Some(earlier) => earlier.merge(write),
                None => write,
            };

            if inner.offline.is_offline() {
                tracing::info!(uid, "offline, queueing remote write");
                inner.cache.set_pending_write(&uid, &write).await;
                return;
            }

            let policy = inner.background;
            let delivered = retry_while(
                &policy,
                "profile write",
                |_| reconciler.deliver(&uid, &write),
                StoreError::is_transient,
            )
            .await;
            match delivered {
                Ok(()) => {
                    inner.cache.clear_pending_write(&uid).await;
                    inner.cache.touch_sync(&uid).await;
                    inner.offline.set_offline(false).await;
                    tracing::info!(uid, "profile saved remotely");
                }
                Err(AttemptError::Failed(e)) if !e.is_transient() => {
                    tracing::warn!(uid, error = %e, "profile write rejected, not retrying");
                    inner.cache.clear_pending_write(&uid).await;
                }
                Err(e) => {
                    tracing::warn!(uid, error = %e, "background write failed, queued for later");
                    inner.cache.set_pending_write(&uid, &write).await;
                    inner.offline.set_offline(true).await;
                }
            }
            drop(guard);
            reconciler.publish_current().await;
        });
        self.track(handle).await;
    }
}
