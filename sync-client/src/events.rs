//! State change notifications.
//!
//! Components holding derived in-memory state subscribe here and refresh
//! from the store when the tracked key space changed underneath them.

use sync_types::{DeviceId, Timestamp};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Why the whole state must be re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationCause {
    /// An undo restored earlier values.
    Undo,
    /// A redo reapplied a mutation.
    Redo,
}

/// A change to the local state that readers should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    /// A pulled remote snapshot overwrote the tracked keys.
    RemoteApplied {
        /// Timestamp of the applied snapshot.
        updated_at: Timestamp,
        /// Device that produced it.
        updated_by: DeviceId,
    },
    /// A snapshot restore changed arbitrary keys.
    Invalidated {
        /// What caused it.
        cause: InvalidationCause,
    },
}

/// Broadcast hub for [`StateChange`]s.
///
/// Clones share the same channel. Emitting with no subscribers is fine, and
/// a receiver that falls behind only misses events.
#[derive(Debug, Clone)]
pub struct StateEvents {
    sender: broadcast::Sender<StateChange>,
}

impl Default for StateEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl StateEvents {
    /// Create a hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.sender.subscribe()
    }

    /// Publish an event.
    pub fn emit(&self, change: StateChange) {
        let receivers = self.sender.send(change.clone()).unwrap_or(0);
        tracing::debug!(?change, receivers, "State change");
    }
}
