//! Session Client Module
//!
//! Client-side session and profile reconciliation for the marketplace: the
//! signed-in identity, the profile and role presented for it, and the local
//! cache that keeps both available while the hosted services are out of
//! reach.
//!
//! # Architecture
//!
//! - **`auth`** - Identity provider trait and identity toolkit REST client
//! - **`remote`** - Profile store trait and document database REST client
//! - **`local_db`** - Key-value storage (SQLite, in-memory)
//! - **`cache`** - Profile cache over the key-value storage
//! - **`offline`** - Offline mode, pending writes and the retry utility
//! - **`sync`** - Session reconciler and network monitor
//! - **`config`** - Environment-aware configuration
//! - **`types`** - Identity and REST wire types
//! - **`main`** - Interactive session driver (binary)
//!
//! # Module Structure
//!
//! ```text
//! client/
//! ├── mod.rs        - Module exports and documentation
//! ├── main.rs       - Session driver entry point
//! ├── auth.rs       - Identity provider
//! ├── remote.rs     - Profile store
//! ├── cache.rs      - Local profile cache
//! ├── config.rs     - Configuration
//! ├── error.rs      - Session errors
//! ├── types.rs      - Identity and wire types
//! ├── local_db/     - Key-value storage
//! ├── offline/      - Offline mode and retries
//! └── sync/         - Reconciler and network monitor
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod local_db;
pub mod offline;
pub mod remote;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use auth::{AuthError, IdentityProvider, IdentityToolkitClient, PhoneConfirmation};
pub use cache::{CacheKey, CacheKeys, LocalCache};
pub use config::Config;
pub use error::SessionError;
pub use local_db::{KeyValueStore, LocalDatabase, MemoryStore, StorageError};
pub use offline::{OfflineMode, PendingWrite, RetryPolicy};
pub use remote::{FirestoreClient, ProfileStore, ProfileUpdate, StoreError};
pub use sync::{
    ConnectivityEvent, FallbackSource, NetworkMonitor, NetworkStatus, Resolution, SessionPhase,
    SessionReconciler, SessionSnapshot,
};
pub use types::Identity;
