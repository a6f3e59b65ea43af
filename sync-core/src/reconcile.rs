//! Last-write-wins decisions and the plan for applying a pulled snapshot.
//!
//! Only `updated_at` ordering matters. A remote snapshot is applied iff it is
//! strictly newer than the last timestamp this device pushed or applied;
//! equal timestamps count as "not newer", which keeps pulls idempotent.

use std::collections::BTreeMap;
use sync_types::{DeviceId, Snapshot, Timestamp};

use crate::keys::TrackedKeySpec;

/// Whether a remote snapshot stamped `remote` should replace local state.
pub fn is_newer(remote: Timestamp, last_synced: Timestamp) -> bool {
    remote > last_synced
}

/// Whether `snapshot` is this device's own write coming back.
///
/// Only an optimization for the realtime path; the timestamp rule alone
/// already keeps echoes from changing anything.
pub fn is_echo(snapshot: &Snapshot, device: DeviceId) -> bool {
    snapshot.updated_by() == device
}

/// Timestamp for the next push.
///
/// Never earlier than wall-clock time and always strictly after anything
/// already synced, so a device with a slow clock still produces snapshots
/// that other devices consider newer.
pub fn next_push_timestamp(now: Timestamp, last_synced: Timestamp) -> Timestamp {
    now.max(last_synced.next())
}

/// Store writes needed to make local tracked state equal a remote snapshot.
///
/// The remote snapshot is authoritative over the whole tracked set: tracked
/// keys it does not mention are removed. Keys the remote sends that this
/// device does not track are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyPlan {
    /// Keys to set, with their new values.
    pub writes: BTreeMap<String, String>,
    /// Keys to remove.
    pub removals: Vec<String>,
}

impl ApplyPlan {
    /// Diff current local tracked values against the remote values.
    pub fn build(
        spec: &TrackedKeySpec,
        local: &BTreeMap<String, String>,
        remote: &BTreeMap<String, String>,
    ) -> Self {
        let writes = remote
            .iter()
            .filter(|(key, _)| spec.is_tracked(key))
            .filter(|(key, value)| local.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let removals = local
            .keys()
            .filter(|key| spec.is_tracked(key) && !remote.contains_key(*key))
            .cloned()
            .collect();

        Self { writes, removals }
    }

    /// Whether applying would change nothing.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.removals.is_empty()
    }
}
