//! Audit log with undo/redo over exact key snapshots.
//!
//! Reversal never replays business logic. Before a mutation the caller
//! captures the current values of every key it may touch; undo writes those
//! values back (removing keys that were absent), after first capturing the
//! post-mutation values so redo can reapply them the same way.
//!
//! # Example
//!
//! ```ignore
//! let log = AuditLog::open(store.clone(), events.clone())?;
//! log.record(
//!     NewEntry::new("alice", ActionKind::AdjustQty).with_subject("item", "bolt"),
//!     ["inventory.bolt"],
//!     |store| store.set("inventory.bolt", "12"),
//! )?;
//! assert!(log.undo_last()?);
//! ```

use crate::events::{InvalidationCause, StateChange, StateEvents};
use crate::store::{StateStore, StoreError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sync_core::{History, AUDIT_ENTRIES_KEY, AUDIT_REDO_KEY, DEFAULT_HISTORY_CAPACITY};
use sync_types::{AuditEntry, EntryId, KeyValues, NewEntry, Timestamp, UndoPayload};
use thiserror::Error;

/// Audit log errors.
///
/// These always mean local state could not be read or written; callers
/// should surface them.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The state store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The history could not be encoded for persistence.
    #[error("history encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Bounded, persisted undo/redo history over a [`StateStore`].
pub struct AuditLog {
    store: Arc<dyn StateStore>,
    history: Mutex<History>,
    events: StateEvents,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let history = self.lock();
        f.debug_struct("AuditLog")
            .field("entries", &history.len())
            .field("redo", &history.redo_len())
            .field("capacity", &history.capacity())
            .finish()
    }
}

impl AuditLog {
    /// Open the log persisted in `store`, with the default capacity.
    pub fn open(store: Arc<dyn StateStore>, events: StateEvents) -> Result<Self, AuditError> {
        Self::with_capacity(store, events, DEFAULT_HISTORY_CAPACITY)
    }

    /// Open the log keeping at most `capacity` entries on each stack.
    ///
    /// Persisted history that does not decode is logged and discarded.
    pub fn with_capacity(
        store: Arc<dyn StateStore>,
        events: StateEvents,
        capacity: usize,
    ) -> Result<Self, AuditError> {
        let entries = load_list(store.as_ref(), AUDIT_ENTRIES_KEY)?;
        let redo = load_list(store.as_ref(), AUDIT_REDO_KEY)?;
        Ok(Self {
            store,
            history: Mutex::new(History::from_parts(entries, redo, capacity)),
            events,
        })
    }

    /// Current values of exactly `keys`; `None` where a key is absent.
    pub fn snapshot_keys<I>(&self, keys: I) -> Result<KeyValues, StoreError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        keys.into_iter()
            .map(|key| {
                let key = key.as_ref();
                Ok((key.to_string(), self.store.get(key)?))
            })
            .collect()
    }

    /// Write each value back, removing keys whose value is `None`.
    pub fn restore_keys(&self, values: &KeyValues) -> Result<(), StoreError> {
        for (key, value) in values {
            match value {
                Some(value) => self.store.set(key, value)?,
                None => self.store.remove(key)?,
            }
        }
        Ok(())
    }

    /// Capture an undo payload for `keys`. Call before mutating them.
    pub fn make_undo<I>(&self, keys: I) -> Result<UndoPayload, StoreError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Ok(UndoPayload::restore_keys(self.snapshot_keys(keys)?))
    }

    /// Append an entry with a fresh id and timestamp. Clears redo.
    pub fn add_entry(&self, entry: NewEntry) -> Result<AuditEntry, AuditError> {
        let entry = entry.into_entry(EntryId::new(), Timestamp::now());
        let mut history = self.lock();
        history.record(entry.clone());
        self.persist(&history)?;
        tracing::debug!(id = %entry.id, action = %entry.action, "Recorded audit entry");
        Ok(entry)
    }

    /// Run a reversible mutation and record it.
    ///
    /// Captures `keys` first, then runs `mutate` against the store. The entry
    /// is only added if the mutation succeeds.
    pub fn record<I, F>(&self, entry: NewEntry, keys: I, mutate: F) -> Result<AuditEntry, AuditError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: FnOnce(&dyn StateStore) -> Result<(), StoreError>,
    {
        let undo = self.make_undo(keys)?;
        mutate(self.store.as_ref())?;
        self.add_entry(entry.with_undo(undo))
    }

    /// Revert the most recent entry.
    ///
    /// Returns `false` without side effects when the log is empty or the most
    /// recent entry is informational.
    pub fn undo_last(&self) -> Result<bool, AuditError> {
        let mut history = self.lock();
        let Some(stored) = history.undo_candidate().and_then(|e| e.undo.clone()) else {
            return Ok(false);
        };

        let redo = self.make_undo(stored.key_names())?;
        self.restore_keys(stored.keys())?;
        if let Some(entry) = history.commit_undo(redo) {
            tracing::info!(id = %entry.id, action = %entry.action, "Undid audit entry");
        }
        self.persist(&history)?;
        drop(history);

        self.events.emit(StateChange::Invalidated {
            cause: InvalidationCause::Undo,
        });
        Ok(true)
    }

    /// Reapply the most recently undone entry.
    ///
    /// Returns `false` when there is nothing to redo.
    pub fn redo_last(&self) -> Result<bool, AuditError> {
        let mut history = self.lock();
        let Some(stored) = history.redo_candidate().and_then(|e| e.undo.clone()) else {
            return Ok(false);
        };

        let undo = self.make_undo(stored.key_names())?;
        self.restore_keys(stored.keys())?;
        if let Some(entry) = history.commit_redo(undo, Timestamp::now()) {
            tracing::info!(id = %entry.id, action = %entry.action, "Redid audit entry");
        }
        self.persist(&history)?;
        drop(history);

        self.events.emit(StateChange::Invalidated {
            cause: InvalidationCause::Redo,
        });
        Ok(true)
    }

    /// Recorded entries, most recent first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().entries().cloned().collect()
    }

    /// Undone entries, most recent first.
    pub fn redo_entries(&self) -> Vec<AuditEntry> {
        self.lock().redo_entries().cloned().collect()
    }

    /// Whether `undo_last()` would do something.
    pub fn can_undo(&self) -> bool {
        self.lock().undo_candidate().is_some()
    }

    /// Whether `redo_last()` would do something.
    pub fn can_redo(&self) -> bool {
        self.lock().redo_candidate().is_some()
    }

    /// Forget all history. State is not touched.
    pub fn clear(&self) -> Result<(), AuditError> {
        let mut history = self.lock();
        history.clear();
        self.persist(&history)
    }

    fn persist(&self, history: &History) -> Result<(), AuditError> {
        let (entries, redo) = history.to_parts();
        self.store
            .set(AUDIT_ENTRIES_KEY, &serde_json::to_string(&entries)?)?;
        self.store.set(AUDIT_REDO_KEY, &serde_json::to_string(&redo)?)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_list(store: &dyn StateStore, key: &str) -> Result<Vec<AuditEntry>, StoreError> {
    let Some(raw) = store.get(key)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str(&raw) {
        Ok(list) => Ok(list),
        Err(e) => {
            tracing::warn!(key, error = %e, "Persisted history is malformed, starting empty");
            Ok(Vec::new())
        }
    }
}
