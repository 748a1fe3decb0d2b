//! # Offline Mode
//!
//! Tracks whether the session layer should attempt remote calls at all, and
//! remembers remote writes that could not be delivered.
//!
//! ## Key Components
//!
//! - [`OfflineMode`]: network reachability plus a persisted forced-offline
//!   flag; the effective state is `!network_online || forced`
//! - [`PendingWrite`]: the latest undelivered profile write for a uid,
//!   flushed before the next remote read of that uid
//! - `retry.rs`: timeout-bounded retry loop with linear backoff

pub mod retry;

pub use retry::{retry_while, retry_with_timeout, AttemptError, LinearBackoff, RetryPolicy};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

use crate::client::cache::LocalCache;
use crate::client::remote::ProfileUpdate;
use crate::shared::UserProfile;

/// Process-wide connectivity state
#[derive(Debug)]
pub struct OfflineMode {
    cache: LocalCache,
    network_online: AtomicBool,
    forced: AtomicBool,
    indicator: watch::Sender<bool>,
}

impl OfflineMode {
    /// Restore the forced flag persisted by a previous run
    pub async fn load(cache: LocalCache) -> Self {
        let forced = cache.offline_override().await;
        if forced {
            tracing::info!("restored forced offline mode");
        }
        let (indicator, _) = watch::channel(forced);
        Self {
            cache,
            network_online: AtomicBool::new(true),
            forced: AtomicBool::new(forced),
            indicator,
        }
    }

    pub fn is_network_online(&self) -> bool {
        self.network_online.load(Ordering::SeqCst)
    }

    pub fn is_forced(&self) -> bool {
        self.forced.load(Ordering::SeqCst)
    }

    /// Effective state read before every remote attempt
    pub fn is_offline(&self) -> bool {
        !self.is_network_online() || self.is_forced()
    }

    /// Record raw reachability reported by the host platform
    pub fn set_network_online(&self, online: bool) {
        let previous = self.network_online.swap(online, Ordering::SeqCst);
        if previous != online {
            tracing::info!(online, "network reachability changed");
        }
        self.publish();
    }

    /// Set or clear the persisted forced-offline flag
    pub async fn set_offline(&self, offline: bool) {
        let previous = self.forced.swap(offline, Ordering::SeqCst);
        if previous != offline {
            tracing::info!(offline, "offline mode changed");
            self.cache.set_offline_override(offline).await;
        }
        self.publish();
    }

    /// Receives the effective offline state whenever it may have changed
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.indicator.subscribe()
    }

    fn publish(&self) {
        self.indicator.send_replace(self.is_offline());
    }
}

/// A remote profile write that failed in the background
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingWrite {
    /// Full document replace, as issued at sign-up
    Replace { profile: UserProfile },
    /// Partial merge, as issued by role assignment
    Update { update: ProfileUpdate },
}

impl PendingWrite {
    /// Fold a newer write into this one
    pub fn merge(self, newer: PendingWrite) -> PendingWrite {
        match (self, newer) {
            (_, PendingWrite::Replace { profile }) => PendingWrite::Replace { profile },
            (PendingWrite::Replace { mut profile }, PendingWrite::Update { update }) => {
                update.apply_to(&mut profile);
                PendingWrite::Replace { profile }
            }
            (PendingWrite::Update { update: older }, PendingWrite::Update { update }) => {
                PendingWrite::Update {
                    update: older.merged(update),
                }
            }
        }
    }

    /// What the remote document will hold once this write lands
    pub fn overlay(&self, remote: UserProfile) -> UserProfile {
        match self {
            PendingWrite::Replace { profile } => profile.clone(),
            PendingWrite::Update { update } => {
                let mut profile = remote;
                update.apply_to(&mut profile);
                profile
            }
        }
    }
}
