//! Bounded undo/redo stacks.
//!
//! Entries flow `recorded -> (undo) -> redo stack -> (redo) -> entries`.
//! Both stacks are most-recent-first and capped at the same capacity; the
//! oldest entries are dropped silently. Recording a new entry clears the
//! redo stack, since redo is only coherent right after an undo.
//!
//! Undo and redo are split into a `*_candidate` peek and a `commit_*` step so
//! the caller can restore state in between and leave the stacks untouched if
//! that restore fails.

use std::collections::VecDeque;
use sync_types::{AuditEntry, Timestamp, UndoPayload};

/// Default number of entries kept on each stack.
pub const DEFAULT_HISTORY_CAPACITY: usize = 2000;

/// The audit entry list and redo stack of one log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    entries: VecDeque<AuditEntry>,
    redo: VecDeque<AuditEntry>,
    capacity: usize,
}

impl History {
    /// Create empty stacks holding at most `capacity` entries each.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            redo: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Rebuild from persisted lists (most recent first), enforcing capacity.
    pub fn from_parts(entries: Vec<AuditEntry>, redo: Vec<AuditEntry>, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        history.entries = entries.into();
        history.redo = redo.into();
        history.entries.truncate(history.capacity);
        history.redo.truncate(history.capacity);
        history
    }

    /// Maximum entries per stack.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a new entry and invalidate redo.
    pub fn record(&mut self, entry: AuditEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
        self.redo.clear();
    }

    /// The most recent entry, if it can be undone.
    ///
    /// An informational entry on top blocks undo even when older entries
    /// are reversible.
    pub fn undo_candidate(&self) -> Option<&AuditEntry> {
        self.entries.front().filter(|entry| entry.is_reversible())
    }

    /// Move the most recent entry onto the redo stack, carrying `redo` as
    /// the payload that reapplies it.
    pub fn commit_undo(&mut self, redo: UndoPayload) -> Option<AuditEntry> {
        self.undo_candidate()?;
        let mut entry = self.entries.pop_front()?;
        entry.undo = Some(redo);
        self.redo.push_front(entry.clone());
        self.redo.truncate(self.capacity);
        Some(entry)
    }

    /// The most recently undone entry.
    pub fn redo_candidate(&self) -> Option<&AuditEntry> {
        self.redo.front()
    }

    /// Move the most recently undone entry back onto the entry list with a
    /// fresh timestamp, carrying `undo` as its new inverse.
    pub fn commit_redo(&mut self, undo: UndoPayload, ts: Timestamp) -> Option<AuditEntry> {
        let mut entry = self.redo.pop_front()?;
        entry.undo = Some(undo);
        entry.ts = ts;
        self.entries.push_front(entry.clone());
        self.entries.truncate(self.capacity);
        Some(entry)
    }

    /// Recorded entries, most recent first.
    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    /// Undone entries, most recent first.
    pub fn redo_entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.redo.iter()
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries on the redo stack.
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.redo.clear();
    }

    /// Copies of both stacks for persistence.
    pub fn to_parts(&self) -> (Vec<AuditEntry>, Vec<AuditEntry>) {
        (
            self.entries.iter().cloned().collect(),
            self.redo.iter().cloned().collect(),
        )
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
