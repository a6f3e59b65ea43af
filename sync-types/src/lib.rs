//! # sync-types
//!
//! Data model for the stockroom replication core.
//!
//! This crate provides the foundational types used across all stockroom crates:
//! - [`DeviceId`], [`EntryId`], [`SpaceId`], [`Timestamp`] - Identity and ordering types
//! - [`Snapshot`] - Full copy of the tracked key space, attributed to one device
//! - [`RemoteRow`] - The single row a remote backend keeps per space
//! - [`AuditEntry`], [`UndoPayload`] - Reversible mutation records
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod audit;
mod error;
mod ids;
mod snapshot;

pub use audit::{ActionKind, AuditEntry, KeyValues, NewEntry, UndoPayload};
pub use error::TypesError;
pub use ids::{DeviceId, EntryId, SpaceId, Timestamp};
pub use snapshot::{RemoteRow, Snapshot};
