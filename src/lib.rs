//! WhoGoFixAm - Session Library
//!
//! Client-side session and profile reconciliation for the WhoGoFixAm
//! community services marketplace, where learners, skilled professionals and
//! customers sign in against a hosted identity service and keep their
//! profile in a hosted document database.
//!
//! # Overview
//!
//! The library layers a persistent local cache over both hosted services so
//! that a profile, and the role that decides what a user sees, stays
//! available when the network or the services are not:
//!
//! - Offline-first profile resolution with a 30-day freshness window
//! - Bounded remote fetches with timeout, retry and backoff
//! - Background refreshes and writes that never block the caller
//! - A persisted offline mode fed by connectivity events
//!
//! # Module Structure
//!
//! - **`shared`** - Profile types, configuration and shared errors
//! - **`client`** - Identity provider, profile store, cache and the session
//!   reconciler
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use whogofixam::client::{
//!     Config, FirestoreClient, IdentityProvider, IdentityToolkitClient, LocalDatabase,
//!     SessionReconciler,
//! };
//!
//! let config = Config::from_env()?;
//! let identity = Arc::new(IdentityToolkitClient::new(config.app())?);
//! let store = Arc::new(FirestoreClient::new(config.app(), identity.subscribe())?);
//! let storage = Arc::new(LocalDatabase::open(config.cache_path()).await?);
//!
//! let reconciler = SessionReconciler::new(identity, store, storage, config.app()).await?;
//! reconciler.listen();
//! ```

pub mod client;
pub mod shared;
