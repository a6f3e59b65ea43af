//! # sync-core
//!
//! Pure logic for stockroom (no I/O, instant tests).
//!
//! This crate implements the decisions behind synchronization and undo
//! without touching a store or a network, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`keys`] decides which store keys are replicated
//! - [`signature`] detects "did anything tracked change" cheaply
//! - [`reconcile`] makes the last-write-wins and echo decisions and plans
//!   how a pulled snapshot overwrites local state
//! - [`history`] keeps the bounded undo/redo stacks
//!
//! The actual I/O (state store, remote backend) is performed by `sync-client`,
//! which executes the plans produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod history;
pub mod keys;
pub mod reconcile;
pub mod signature;

pub use history::{History, DEFAULT_HISTORY_CAPACITY};
pub use keys::{
    KeySpecError, TrackedKeySpec, AUDIT_ENTRIES_KEY, AUDIT_REDO_KEY, BOOKKEEPING_KEYS,
    DEVICE_ID_KEY, LAST_SIGNATURE_KEY, LAST_SYNCED_AT_KEY,
};
pub use reconcile::{is_echo, is_newer, next_push_timestamp, ApplyPlan};
pub use signature::Signature;
