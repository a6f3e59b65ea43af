//! Audit entries and the undo payloads that make them reversible.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{EntryId, Timestamp, TypesError};

/// Prior value of each key, `None` meaning "key was absent".
pub type KeyValues = BTreeMap<String, Option<String>>;

/// Kind of business mutation an audit entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// A new item was created.
    AddItem,
    /// An item was deleted.
    DeleteItem,
    /// An item's fields were edited.
    EditItem,
    /// An item's quantity was adjusted in place.
    AdjustQty,
    /// Quantity was moved between locations.
    MoveQty,
    /// An item was stocked at a new location.
    AddToLocation,
}

impl ActionKind {
    /// All kinds, in declaration order.
    pub const ALL: [ActionKind; 6] = [
        ActionKind::AddItem,
        ActionKind::DeleteItem,
        ActionKind::EditItem,
        ActionKind::AdjustQty,
        ActionKind::MoveQty,
        ActionKind::AddToLocation,
    ];

    /// Kebab-case name, as accepted on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::AddItem => "add-item",
            ActionKind::DeleteItem => "delete-item",
            ActionKind::EditItem => "edit-item",
            ActionKind::AdjustQty => "adjust-qty",
            ActionKind::MoveQty => "move-qty",
            ActionKind::AddToLocation => "add-to-location",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = TypesError;

    /// Accepts `add-item`, `add_item` and `ADD_ITEM` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| TypesError::UnknownAction(s.to_string()))
    }
}

/// Exact inverse of a mutation, limited to the keys it could have touched.
///
/// Not a diff: applying it writes every listed value back (or removes the
/// key when the value is `None`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UndoPayload {
    /// Restore each key to the recorded value.
    RestoreKeys {
        /// Key to prior value.
        keys: KeyValues,
    },
}

impl UndoPayload {
    /// Wrap a key snapshot.
    pub fn restore_keys(keys: KeyValues) -> Self {
        UndoPayload::RestoreKeys { keys }
    }

    /// The recorded values.
    pub fn keys(&self) -> &KeyValues {
        match self {
            UndoPayload::RestoreKeys { keys } => keys,
        }
    }

    /// Names of the keys this payload covers.
    pub fn key_names(&self) -> Vec<String> {
        self.keys().keys().cloned().collect()
    }
}

/// A recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique id, kept across undo/redo.
    pub id: EntryId,
    /// When the entry was recorded (or last redone).
    pub ts: Timestamp,
    /// Who performed the mutation.
    pub actor: String,
    /// What kind of mutation it was.
    pub action: ActionKind,
    /// Free-form description of the subject (item id, name, location, ...).
    #[serde(default)]
    pub subject: BTreeMap<String, String>,
    /// Inverse snapshot; informational entries have none.
    #[serde(default)]
    pub undo: Option<UndoPayload>,
}

impl AuditEntry {
    /// Whether undoing this entry is possible.
    pub fn is_reversible(&self) -> bool {
        self.undo.is_some()
    }
}

/// An audit entry before the log assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    /// Who performed the mutation.
    pub actor: String,
    /// What kind of mutation it was.
    pub action: ActionKind,
    /// Subject metadata.
    pub subject: BTreeMap<String, String>,
    /// Inverse snapshot, if the mutation is reversible.
    pub undo: Option<UndoPayload>,
}

impl NewEntry {
    /// Start an informational entry.
    pub fn new(actor: impl Into<String>, action: ActionKind) -> Self {
        Self {
            actor: actor.into(),
            action,
            subject: BTreeMap::new(),
            undo: None,
        }
    }

    /// Add one subject field.
    pub fn with_subject(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.subject.insert(key.into(), value.into());
        self
    }

    /// Attach an undo payload.
    pub fn with_undo(mut self, undo: UndoPayload) -> Self {
        self.undo = Some(undo);
        self
    }

    /// Stamp the entry.
    pub fn into_entry(self, id: EntryId, ts: Timestamp) -> AuditEntry {
        AuditEntry {
            id,
            ts,
            actor: self.actor,
            action: self.action,
            subject: self.subject,
            undo: self.undo,
        }
    }
}
