//! Content signatures for cheap change detection.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Deterministic digest of a tracked value map.
///
/// Computed over the canonical JSON serialization of the sorted map, so two
/// maps with equal signatures hold the same tracked state.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    /// Sign a value map.
    pub fn of(values: &BTreeMap<String, String>) -> Self {
        let canonical = serde_json::to_vec(values).unwrap_or_default();
        let digest = Sha256::new()
            .chain_update(b"stockroom-snapshot-v1")
            .chain_update(&canonical)
            .finalize();
        Self(hex::encode(digest))
    }

    /// Rehydrate a signature read back from the state store.
    pub fn from_stored(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex form, as persisted.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", &self.0[..self.0.len().min(12)])
    }
}
