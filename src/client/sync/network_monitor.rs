//! # Network Monitor
//!
//! Turns connectivity transitions reported by the host into offline mode
//! changes. There is no polling: one check at initialization, then events.
//!
//! - **Online**: clear the forced-offline flag and reconnect the session
//! - **Offline**: set the forced-offline flag

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::sync::SessionReconciler;

/// Connectivity transition reported by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    /// Reachable, but offline mode is forced
    ForcedOffline,
    Offline,
}

#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    reconciler: SessionReconciler,
}

impl NetworkMonitor {
    pub fn new(reconciler: SessionReconciler) -> Self {
        Self { reconciler }
    }

    /// Initial reachability check
    pub async fn initialize(&self, initially_online: bool) {
        let offline = self.reconciler.offline_mode();
        offline.set_network_online(initially_online);
        if !initially_online {
            offline.set_offline(true).await;
        }
        self.reconciler.publish_current().await;
    }

    pub async fn handle(&self, event: ConnectivityEvent) {
        let offline = self.reconciler.offline_mode();
        match event {
            ConnectivityEvent::Online => {
                tracing::info!("network online, reconnecting");
                offline.set_network_online(true);
                offline.set_offline(false).await;
                self.reconciler.retry_connection().await;
            }
            ConnectivityEvent::Offline => {
                tracing::info!("network offline");
                offline.set_network_online(false);
                offline.set_offline(true).await;
                self.reconciler.publish_current().await;
            }
        }
    }

    /// Consume events until every sender is dropped
    pub fn spawn(self, mut events: mpsc::Receiver<ConnectivityEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(event).await;
            }
            tracing::debug!("connectivity event stream closed");
        })
    }

    pub fn status(&self) -> NetworkStatus {
        let offline = self.reconciler.offline_mode();
        if !offline.is_network_online() {
            NetworkStatus::Offline
        } else if offline.is_forced() {
            NetworkStatus::ForcedOffline
        } else {
            NetworkStatus::Online
        }
    }
}
