//! Classification of state store keys into tracked and device-local.
//!
//! A key is tracked iff it starts with one of the configured namespace
//! prefixes and is not in the exclusion set. The classification is an
//! explicit value built and validated once at startup, so every component
//! agrees on the same key space.

use std::collections::BTreeSet;
use thiserror::Error;

/// Persisted device identity.
pub const DEVICE_ID_KEY: &str = "sync.device_id";
/// Timestamp of the last snapshot pushed or applied.
pub const LAST_SYNCED_AT_KEY: &str = "sync.last_synced_at";
/// Signature of the local tracked state at the last push or applied pull.
pub const LAST_SIGNATURE_KEY: &str = "sync.last_signature";
/// Serialized audit entries, most recent first.
pub const AUDIT_ENTRIES_KEY: &str = "audit.entries";
/// Serialized redo stack, most recent first.
pub const AUDIT_REDO_KEY: &str = "audit.redo";

/// Keys owned by the replication core itself. Never tracked.
pub const BOOKKEEPING_KEYS: [&str; 5] = [
    DEVICE_ID_KEY,
    LAST_SYNCED_AT_KEY,
    LAST_SIGNATURE_KEY,
    AUDIT_ENTRIES_KEY,
    AUDIT_REDO_KEY,
];

/// Errors from building a [`TrackedKeySpec`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySpecError {
    /// No namespace prefix was configured.
    #[error("at least one tracked prefix is required")]
    NoPrefixes,

    /// A prefix was empty; it would track every key.
    #[error("tracked prefixes must not be empty")]
    EmptyPrefix,
}

/// The set of keys replicated by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedKeySpec {
    prefixes: Vec<String>,
    exclusions: BTreeSet<String>,
}

impl TrackedKeySpec {
    /// Build and validate a spec.
    ///
    /// Duplicate prefixes are collapsed. Bookkeeping keys are always
    /// excluded, whatever the caller passes.
    pub fn new<P, E>(prefixes: P, exclusions: E) -> Result<Self, KeySpecError>
    where
        P: IntoIterator,
        P::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        let mut unique = Vec::new();
        for prefix in prefixes {
            let prefix = prefix.into();
            if prefix.trim().is_empty() {
                return Err(KeySpecError::EmptyPrefix);
            }
            if !unique.contains(&prefix) {
                unique.push(prefix);
            }
        }
        if unique.is_empty() {
            return Err(KeySpecError::NoPrefixes);
        }

        let mut exclusions: BTreeSet<String> = exclusions.into_iter().map(Into::into).collect();
        exclusions.extend(BOOKKEEPING_KEYS.iter().map(|k| k.to_string()));

        Ok(Self {
            prefixes: unique,
            exclusions,
        })
    }

    /// Whether `key` is replicated.
    pub fn is_tracked(&self, key: &str) -> bool {
        !self.exclusions.contains(key) && self.prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    /// Keep only the tracked keys, sorted.
    pub fn filter<'a, I>(&self, keys: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut tracked: Vec<String> = keys
            .into_iter()
            .filter(|k| self.is_tracked(k))
            .cloned()
            .collect();
        tracked.sort();
        tracked
    }

    /// Configured namespace prefixes.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Excluded keys, bookkeeping keys included.
    pub fn exclusions(&self) -> &BTreeSet<String> {
        &self.exclusions
    }
}
