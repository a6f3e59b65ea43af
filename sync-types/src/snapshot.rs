//! Snapshots of the tracked key space and the remote row that carries them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{DeviceId, SpaceId, Timestamp, TypesError};

/// The full state of every tracked key at one instant, from one device's
/// point of view.
///
/// Immutable once constructed. `values` is a `BTreeMap`, so iteration order
/// (and therefore the signature) is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    updated_at: Timestamp,
    updated_by: DeviceId,
    app_version: String,
    values: BTreeMap<String, String>,
}

impl Snapshot {
    /// Build a snapshot.
    pub fn new(
        updated_at: Timestamp,
        updated_by: DeviceId,
        app_version: impl Into<String>,
        values: BTreeMap<String, String>,
    ) -> Self {
        Self {
            updated_at,
            updated_by,
            app_version: app_version.into(),
            values,
        }
    }

    /// When the snapshot was taken.
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Device that produced the snapshot.
    pub fn updated_by(&self) -> DeviceId {
        self.updated_by
    }

    /// Application version of the producing device.
    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    /// Tracked key/value pairs, sorted by key.
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Consume the snapshot, keeping only its values.
    pub fn into_values(self) -> BTreeMap<String, String> {
        self.values
    }

    /// Encode as the JSON document stored in the remote row.
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Decode a remote document.
    ///
    /// Anything that is not exactly a snapshot (missing fields, non-string
    /// values, bad device id) is rejected.
    pub fn from_document(document: &Value) -> Result<Self, TypesError> {
        Self::deserialize(document).map_err(|e| TypesError::MalformedSnapshot(e.to_string()))
    }
}

/// The single row a remote backend keeps per synchronization space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    /// Space this row belongs to.
    pub id: SpaceId,
    /// The snapshot document, as stored. May be malformed.
    pub payload: Value,
    /// RFC 3339 time of the write, as reported by the backend.
    pub updated_at: String,
}

impl RemoteRow {
    /// Build a row for a snapshot.
    pub fn from_snapshot(space: &SpaceId, snapshot: &Snapshot) -> Self {
        Self {
            id: space.clone(),
            payload: snapshot.to_document(),
            updated_at: snapshot.updated_at().to_rfc3339(),
        }
    }

    /// Decode the payload into a snapshot.
    pub fn snapshot(&self) -> Result<Snapshot, TypesError> {
        Snapshot::from_document(&self.payload)
    }
}
