//! # sync-client
//!
//! Local-first replication for stockroom.
//!
//! This is the library applications embed to keep their persisted state in
//! sync across devices and to offer undo/redo over the same state.
//!
//! ## Features
//!
//! - **State store abstraction**: synchronous string key-value space ([`StateStore`])
//! - **Remote abstraction**: one snapshot row per space ([`RemoteBackend`])
//! - **Sync engine**: last-write-wins by timestamp, echo suppression,
//!   realtime notifications with a polling fallback ([`SyncEngine`])
//! - **Audit log**: bounded undo/redo by exact key snapshots ([`AuditLog`])
//! - **State events**: one hub telling readers to refresh ([`StateEvents`])
//!
//! ## Example
//!
//! ```ignore
//! use sync_client::{EngineConfig, MemoryStore, MockBackend, StateEvents, SyncEngine};
//!
//! let store = Arc::new(MemoryStore::new());
//! let backend = Arc::new(MockBackend::new());
//! let engine = SyncEngine::new(store, Some(backend), config, StateEvents::new())?;
//!
//! engine.start();
//! // ... application runs, mutating the store ...
//! engine.stop().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod backend;
pub mod config;
pub mod engine;
pub mod events;
pub mod identity;
pub mod store;

pub use audit::{AuditError, AuditLog};
pub use backend::{
    CallGate, ChangeFeed, HttpBackend, MockBackend, RemoteBackend, RemoteError, Subscription,
};
pub use config::{EngineConfig, RemoteParams, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL};
pub use engine::{EngineStatus, PullOutcome, PushOutcome, SyncEngine, SyncError};
pub use events::{InvalidationCause, StateChange, StateEvents};
pub use identity::load_or_create_device_id;
pub use store::{FileStore, MemoryStore, StateStore, StoreError};
