//! Mock remote backend for testing.
//!
//! Keeps rows in memory, delivers realtime notifications, counts calls,
//! allows forcing failures and can hold a call open until released.

use super::{ChangeFeed, RemoteBackend, RemoteError, Subscription};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sync_types::{RemoteRow, SpaceId, Timestamp};
use tokio::sync::Notify;

/// Mock remote backend for testing.
///
/// Clones share rows and the change feed, so two engines holding clones
/// behave like two devices talking to one remote.
#[derive(Debug, Clone)]
pub struct MockBackend {
    inner: Arc<Mutex<MockBackendInner>>,
    feed: Arc<ChangeFeed>,
}

#[derive(Debug)]
struct MockBackendInner {
    rows: HashMap<SpaceId, RemoteRow>,
    realtime: bool,
    upsert_count: usize,
    select_count: usize,
    fail_next_upsert: Option<String>,
    fail_next_select: Option<String>,
    fail_next_subscribe: Option<String>,
    hold_next_upsert: Option<Arc<CallGate>>,
    hold_next_select: Option<Arc<CallGate>>,
}

/// A remote call held open by [`MockBackend`] until released.
#[derive(Debug, Default)]
pub struct CallGate {
    entered: Notify,
    release: Notify,
}

impl CallGate {
    /// Wait until the held call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held call finish.
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create an empty backend with realtime notifications enabled.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockBackendInner {
                rows: HashMap::new(),
                realtime: true,
                upsert_count: 0,
                select_count: 0,
                fail_next_upsert: None,
                fail_next_select: None,
                fail_next_subscribe: None,
                hold_next_upsert: None,
                hold_next_select: None,
            })),
            feed: Arc::new(ChangeFeed::new()),
        }
    }

    /// Create a backend without a realtime channel (polling only).
    pub fn polling_only() -> Self {
        let backend = Self::new();
        backend.set_realtime(false);
        backend
    }

    /// Enable or disable realtime notifications and subscriptions.
    pub fn set_realtime(&self, enabled: bool) {
        self.lock().realtime = enabled;
    }

    /// Current row for a space.
    pub fn row(&self, space: &SpaceId) -> Option<RemoteRow> {
        self.lock().rows.get(space).cloned()
    }

    /// Store a raw row as if another writer had put it there.
    ///
    /// With `notify`, subscribers are told about it like a normal upsert.
    pub fn inject_row(&self, row: RemoteRow, notify: bool) {
        let realtime = {
            let mut inner = self.lock();
            inner.rows.insert(row.id.clone(), row.clone());
            inner.realtime
        };
        if notify && realtime {
            self.feed.publish(row);
        }
    }

    /// Number of successful upserts.
    pub fn upsert_count(&self) -> usize {
        self.lock().upsert_count
    }

    /// Number of successful reads.
    pub fn select_count(&self) -> usize {
        self.lock().select_count
    }

    /// Cause the next upsert() to fail with the given error.
    pub fn fail_next_upsert(&self, error: &str) {
        self.lock().fail_next_upsert = Some(error.to_string());
    }

    /// Cause the next select_one() to fail with the given error.
    pub fn fail_next_select(&self, error: &str) {
        self.lock().fail_next_select = Some(error.to_string());
    }

    /// Cause the next subscribe() to fail with the given error.
    pub fn fail_next_subscribe(&self, error: &str) {
        self.lock().fail_next_subscribe = Some(error.to_string());
    }

    /// Hold the next upsert() open until the returned gate is released.
    /// The row is written after release.
    pub fn hold_next_upsert(&self) -> Arc<CallGate> {
        let gate = Arc::new(CallGate::default());
        self.lock().hold_next_upsert = Some(Arc::clone(&gate));
        gate
    }

    /// Hold the next select_one() open until the returned gate is released.
    pub fn hold_next_select(&self) -> Arc<CallGate> {
        let gate = Arc::new(CallGate::default());
        self.lock().hold_next_select = Some(Arc::clone(&gate));
        gate
    }

    fn lock(&self) -> MutexGuard<'_, MockBackendInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    async fn upsert(
        &self,
        space: &SpaceId,
        payload: Value,
        updated_at: Timestamp,
    ) -> Result<(), RemoteError> {
        let gate = self.lock().hold_next_upsert.take();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let row = RemoteRow {
            id: space.clone(),
            payload,
            updated_at: updated_at.to_rfc3339(),
        };
        let realtime = {
            let mut inner = self.lock();
            if let Some(error) = inner.fail_next_upsert.take() {
                return Err(RemoteError::Unavailable(error));
            }
            inner.upsert_count += 1;
            inner.rows.insert(space.clone(), row.clone());
            inner.realtime
        };
        if realtime {
            self.feed.publish(row);
        }
        Ok(())
    }

    async fn select_one(&self, space: &SpaceId) -> Result<Option<RemoteRow>, RemoteError> {
        let gate = self.lock().hold_next_select.take();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_select.take() {
            return Err(RemoteError::Unavailable(error));
        }
        inner.select_count += 1;
        Ok(inner.rows.get(space).cloned())
    }

    async fn subscribe(&self, space: &SpaceId) -> Result<Subscription, RemoteError> {
        {
            let mut inner = self.lock();
            if let Some(error) = inner.fail_next_subscribe.take() {
                return Err(RemoteError::Unavailable(error));
            }
            if !inner.realtime {
                return Err(RemoteError::Unsupported("realtime notifications"));
            }
        }
        Ok(self.feed.subscribe(space))
    }
}
