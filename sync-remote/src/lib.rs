//! # sync-remote
//!
//! Durable remote backend for stockroom sync.
//!
//! [`SqliteBackend`] keeps one snapshot row per synchronization space in a
//! single SQLite table and implements the client's `RemoteBackend` trait, so
//! devices on one machine (or sharing one database file) can sync without a
//! network service.
//!
//! ## Architecture
//!
//! ```text
//! Device A ──┐                       ┌── Device B
//!            │   upsert / select_one │
//!        ┌───┴───────────────────────┴───┐
//!        │        SqliteBackend          │
//!        │  ┌─────────────────────────┐  │
//!        │  │ app_state(id, payload,  │  │
//!        │  │           updated_at)   │  │
//!        │  └─────────────────────────┘  │
//!        └───────────────────────────────┘
//! ```
//!
//! Writers on the same backend instance notify each other's subscriptions;
//! other processes pick changes up by polling.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod sqlite;

pub use error::StorageError;
pub use sqlite::SqliteBackend;
