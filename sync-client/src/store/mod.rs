//! State store abstraction.
//!
//! The replication core never talks to a storage medium directly. It reads
//! and writes one synchronous, string-keyed key-value space local to the
//! device, described by [`StateStore`].
//!
//! # Implementations
//!
//! - [`MemoryStore`]: in-memory, shared between clones, with forced failures
//!   for tests
//! - [`FileStore`]: the whole space persisted as one JSON file

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

/// State store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data could not be decoded.
    #[error("store is corrupt: {0}")]
    Corrupt(String),

    /// The store refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A persisted, synchronous, string-keyed key-value space.
///
/// Implementations must be safe to share between the sync engine task and
/// the code issuing business mutations.
pub trait StateStore: Send + Sync {
    /// Read a value; `None` if the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, creating the key if needed.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys currently present, in no particular order.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}
