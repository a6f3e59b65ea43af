//! SyncEngine: keeps the tracked key space and one remote snapshot row
//! eventually consistent.
//!
//! # Architecture
//!
//! The engine owns no state of its own beyond a few flags. Everything durable
//! (device id, last synced timestamp, last signature) lives in the
//! [`StateStore`] under bookkeeping keys, and every decision comes from the
//! pure functions in sync-core.
//!
//! ```text
//! StateStore ──push──▶ RemoteBackend
//!     ▲                    │
//!     └──────pull──────────┘  (interval tick, or change notification)
//! ```
//!
//! Conflicts resolve last-write-wins on the snapshot's `updatedAt`. A pull
//! sets the `applying_remote` guard while it overwrites local keys, and push
//! refuses to run while it is set. Applying is all-or-nothing: if a store
//! write fails, the keys touched so far are restored and push stays
//! suppressed until a later pull completes. Push and pull are also
//! serialized with an async mutex so the background task and direct callers
//! never interleave.
//!
//! # Example
//!
//! ```ignore
//! let engine = SyncEngine::new(store, Some(backend), config, events)?;
//! engine.start();
//! // ...
//! engine.stop().await; // final pull + push, then teardown
//! ```

use crate::backend::{RemoteBackend, RemoteError, Subscription};
use crate::config::EngineConfig;
use crate::events::{StateChange, StateEvents};
use crate::identity::load_or_create_device_id;
use crate::store::{StateStore, StoreError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sync_core::{
    is_echo, is_newer, next_push_timestamp, ApplyPlan, Signature, LAST_SIGNATURE_KEY,
    LAST_SYNCED_AT_KEY,
};
use sync_types::{DeviceId, RemoteRow, Snapshot, Timestamp};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Errors inside a sync round.
///
/// Never returned from [`SyncEngine::push`] or [`SyncEngine::pull`]; they
/// are logged and reported as a `Failed` outcome.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local state could not be read or written.
    #[error("local store: {0}")]
    Store(#[from] StoreError),

    /// The remote call failed.
    #[error("remote: {0}")]
    Remote(#[from] RemoteError),
}

/// Result of a push attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// No remote configured.
    Disabled,
    /// The engine was torn down; the result was ignored.
    Stopped,
    /// A pull was applying remote state, or the last apply failed and no
    /// pull has completed since.
    Suppressed,
    /// Tracked state matches the last pushed or applied signature.
    Unchanged,
    /// A new snapshot was written.
    Pushed {
        /// Timestamp stamped on the snapshot.
        updated_at: Timestamp,
        /// Number of tracked keys it carried.
        keys: usize,
    },
    /// The attempt failed and will be retried on the next tick.
    Failed(String),
}

/// Result of a pull attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// No remote configured.
    Disabled,
    /// The engine was torn down; the result was ignored.
    Stopped,
    /// The remote holds no row for this space.
    NoSnapshot,
    /// The remote row is not a valid snapshot.
    Malformed,
    /// The remote snapshot is not newer than the last one synced.
    NotNewer,
    /// A change notification echoed this device's own push.
    Echo,
    /// The remote snapshot replaced the tracked keys.
    Applied {
        /// Timestamp of the applied snapshot.
        updated_at: Timestamp,
        /// Keys written.
        written: usize,
        /// Keys removed.
        removed: usize,
    },
    /// The attempt failed and will be retried on the next tick.
    Failed(String),
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    /// Whether a remote is configured.
    pub enabled: bool,
    /// Whether the background task is running.
    pub running: bool,
    /// This device's id.
    pub device_id: DeviceId,
    /// Timestamp of the last pushed or applied snapshot.
    pub last_synced_at: Timestamp,
    /// Signature of the tracked state at that time.
    pub last_signature: Option<String>,
}

/// Background task handle.
struct EngineTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct EngineInner {
    store: Arc<dyn StateStore>,
    backend: Option<Arc<dyn RemoteBackend>>,
    config: EngineConfig,
    device_id: DeviceId,
    events: StateEvents,
    applying_remote: AtomicBool,
    pull_pending: AtomicBool,
    torn_down: AtomicBool,
    sync_lock: tokio::sync::Mutex<()>,
}

/// Sets `applying_remote` for as long as it lives.
struct ApplyingRemote<'a>(&'a AtomicBool);

impl<'a> ApplyingRemote<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ApplyingRemote<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The sync engine for one synchronization space.
///
/// Without a backend the engine is inert: `start()` does nothing and every
/// operation reports `Disabled`.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    task: Mutex<Option<EngineTask>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("space", &self.inner.config.space)
            .field("device_id", &self.inner.device_id)
            .field("enabled", &self.inner.backend.is_some())
            .finish()
    }
}

impl SyncEngine {
    /// Create an engine.
    ///
    /// Loads (or generates) the device id, which is the only step that can
    /// fail.
    pub fn new(
        store: Arc<dyn StateStore>,
        backend: Option<Arc<dyn RemoteBackend>>,
        config: EngineConfig,
        events: StateEvents,
    ) -> Result<Self, StoreError> {
        let device_id = load_or_create_device_id(store.as_ref())?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                store,
                backend,
                config,
                device_id,
                events,
                applying_remote: AtomicBool::new(false),
                pull_pending: AtomicBool::new(false),
                torn_down: AtomicBool::new(false),
                sync_lock: tokio::sync::Mutex::new(()),
            }),
            task: Mutex::new(None),
        })
    }

    /// This device's id.
    pub fn device_id(&self) -> DeviceId {
        self.inner.device_id
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Whether a remote is configured.
    pub fn is_enabled(&self) -> bool {
        self.inner.backend.is_some()
    }

    /// Receive state change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.inner.events.subscribe()
    }

    /// Snapshot of every tracked key, stamped for the next push.
    pub fn compute_local_snapshot(&self) -> Result<Snapshot, StoreError> {
        self.inner.compute_local_snapshot()
    }

    /// Push local tracked state if it changed since the last sync.
    pub async fn push(&self) -> PushOutcome {
        self.inner.push().await
    }

    /// Pull the remote snapshot and apply it if it is newer.
    pub async fn pull(&self) -> PullOutcome {
        self.inner.pull().await
    }

    /// Handle a change notification for this space.
    ///
    /// Notifications of this device's own pushes are skipped; anything else
    /// triggers a pull.
    pub async fn on_remote_change(&self, row: &RemoteRow) -> PullOutcome {
        self.inner.on_remote_change(row).await
    }

    /// Start the background task. Returns `false` if the engine is inert,
    /// already running, or stopped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let Some(backend) = self.inner.backend.clone() else {
            tracing::info!("Sync disabled, engine not started");
            return false;
        };
        if self.inner.torn_down.load(Ordering::SeqCst) {
            tracing::warn!("Engine already stopped, not restarting");
            return false;
        }

        let mut task = self.lock_task();
        if task.is_some() {
            return false;
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run(backend, shutdown_rx).await });
        *task = Some(EngineTask { shutdown, handle });

        tracing::info!(
            space = %self.inner.config.space,
            device = %self.inner.device_id,
            interval_ms = self.inner.config.tick_interval().as_millis() as u64,
            "Sync engine started"
        );
        true
    }

    /// Stop the engine.
    ///
    /// The background task performs a final pull and push, releases its
    /// subscription and exits; this waits for it. Afterwards the engine is
    /// torn down and results of any in-flight remote call are ignored.
    pub async fn stop(&self) {
        let task = self.lock_task().take();
        if let Some(task) = task {
            let _ = task.shutdown.send(());
            if let Err(e) = task.handle.await {
                tracing::warn!(error = %e, "Sync task ended abnormally");
            }
        }
        if !self.inner.torn_down.swap(true, Ordering::SeqCst) {
            tracing::info!("Sync engine stopped");
        }
    }

    /// Current status.
    pub fn status(&self) -> EngineStatus {
        let running = self
            .lock_task()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished());
        EngineStatus {
            enabled: self.is_enabled(),
            running,
            device_id: self.inner.device_id,
            last_synced_at: self.inner.last_synced_at().unwrap_or(Timestamp::ZERO),
            last_signature: self
                .inner
                .last_signature()
                .ok()
                .flatten()
                .map(|s| s.as_str().to_string()),
        }
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<EngineTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        let task = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.handle.abort();
        }
    }
}

impl EngineInner {
    async fn run(
        self: Arc<Self>,
        backend: Arc<dyn RemoteBackend>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut subscription = match backend.subscribe(&self.config.space).await {
            Ok(subscription) => Some(subscription),
            Err(RemoteError::Unsupported(what)) => {
                tracing::info!(what, "No realtime channel, polling only");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Subscription failed, polling only");
                None
            }
        };

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                change = next_change(&mut subscription) => match change {
                    Some(row) => {
                        self.on_remote_change(&row).await;
                    }
                    None => {
                        tracing::warn!("Change feed closed, polling only");
                        subscription = None;
                    }
                },

                _ = ticker.tick() => {
                    self.pull().await;
                    self.push().await;
                }
            }
        }

        tracing::debug!("Final sync round before shutdown");
        self.pull().await;
        self.push().await;
        drop(subscription);
    }

    async fn push(&self) -> PushOutcome {
        let Some(backend) = &self.backend else {
            return PushOutcome::Disabled;
        };
        if self.torn_down.load(Ordering::SeqCst) {
            return PushOutcome::Stopped;
        }
        if self.applying_remote.load(Ordering::SeqCst) {
            tracing::debug!("Push suppressed while applying remote state");
            return PushOutcome::Suppressed;
        }

        let _serial = self.sync_lock.lock().await;
        if self.pull_pending.load(Ordering::SeqCst) {
            tracing::debug!("Push suppressed until remote state is applied");
            return PushOutcome::Suppressed;
        }
        match self.try_push(backend.as_ref()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "Push failed, retrying next tick");
                PushOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_push(&self, backend: &dyn RemoteBackend) -> Result<PushOutcome, SyncError> {
        let snapshot = self.compute_local_snapshot()?;
        let signature = Signature::of(snapshot.values());
        if self.last_signature()?.as_ref() == Some(&signature) {
            tracing::debug!(%signature, "Tracked state unchanged, skipping push");
            return Ok(PushOutcome::Unchanged);
        }

        let updated_at = snapshot.updated_at();
        backend
            .upsert(&self.config.space, snapshot.to_document(), updated_at)
            .await?;

        if self.torn_down.load(Ordering::SeqCst) {
            return Ok(PushOutcome::Stopped);
        }

        self.record_sync(updated_at, &signature)?;
        let keys = snapshot.values().len();
        tracing::info!(%updated_at, keys, "Pushed snapshot");
        Ok(PushOutcome::Pushed { updated_at, keys })
    }

    async fn pull(&self) -> PullOutcome {
        let Some(backend) = &self.backend else {
            return PullOutcome::Disabled;
        };
        if self.torn_down.load(Ordering::SeqCst) {
            return PullOutcome::Stopped;
        }

        let _serial = self.sync_lock.lock().await;
        match self.try_pull(backend.as_ref()).await {
            Ok(PullOutcome::Stopped) => PullOutcome::Stopped,
            Ok(outcome) => {
                self.pull_pending.store(false, Ordering::SeqCst);
                outcome
            }
            Err(e) => {
                tracing::warn!(error = %e, "Pull failed, retrying next tick");
                PullOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_pull(&self, backend: &dyn RemoteBackend) -> Result<PullOutcome, SyncError> {
        let Some(row) = backend.select_one(&self.config.space).await? else {
            return Ok(PullOutcome::NoSnapshot);
        };
        if self.torn_down.load(Ordering::SeqCst) {
            return Ok(PullOutcome::Stopped);
        }

        let snapshot = match row.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Remote snapshot is malformed, ignoring");
                return Ok(PullOutcome::Malformed);
            }
        };

        let last_synced = self.last_synced_at()?;
        if !is_newer(snapshot.updated_at(), last_synced) {
            tracing::debug!(
                remote = %snapshot.updated_at(),
                last = %last_synced,
                "Remote snapshot not newer"
            );
            return Ok(PullOutcome::NotNewer);
        }

        let applied = {
            let _applying = ApplyingRemote::set(&self.applying_remote);
            self.apply(&snapshot)
        };
        let (written, removed) = match applied {
            Ok(counts) => counts,
            Err(e) => {
                self.pull_pending.store(true, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        tracing::info!(
            updated_at = %snapshot.updated_at(),
            updated_by = %snapshot.updated_by(),
            written,
            removed,
            "Applied remote snapshot"
        );
        self.events.emit(StateChange::RemoteApplied {
            updated_at: snapshot.updated_at(),
            updated_by: snapshot.updated_by(),
        });
        Ok(PullOutcome::Applied {
            updated_at: snapshot.updated_at(),
            written,
            removed,
        })
    }

    async fn on_remote_change(&self, row: &RemoteRow) -> PullOutcome {
        if self.backend.is_none() {
            return PullOutcome::Disabled;
        }
        if let Ok(snapshot) = row.snapshot() {
            if is_echo(&snapshot, self.device_id) {
                tracing::debug!(updated_at = %snapshot.updated_at(), "Ignoring echo of own push");
                return PullOutcome::Echo;
            }
        }
        self.pull().await
    }

    /// Overwrite the tracked keys with the snapshot's values.
    ///
    /// On error every key the plan touches, and the sync bookkeeping, is put
    /// back the way it was.
    fn apply(&self, snapshot: &Snapshot) -> Result<(usize, usize), StoreError> {
        let local = self.local_values()?;
        let plan = ApplyPlan::build(&self.config.keys, &local, snapshot.values());

        let mut prior: BTreeMap<String, Option<String>> = plan
            .writes
            .keys()
            .chain(&plan.removals)
            .map(|key| (key.clone(), local.get(key).cloned()))
            .collect();
        for key in [LAST_SYNCED_AT_KEY, LAST_SIGNATURE_KEY] {
            prior.insert(key.to_string(), self.store.get(key)?);
        }

        if let Err(e) = self.write_plan(&plan, snapshot.updated_at()) {
            tracing::warn!(error = %e, keys = prior.len(), "Apply failed, rolling back");
            self.restore(&prior);
            return Err(e);
        }
        Ok((plan.writes.len(), plan.removals.len()))
    }

    fn write_plan(&self, plan: &ApplyPlan, updated_at: Timestamp) -> Result<(), StoreError> {
        for (key, value) in &plan.writes {
            self.store.set(key, value)?;
        }
        for key in &plan.removals {
            self.store.remove(key)?;
        }

        let signature = Signature::of(&self.local_values()?);
        self.record_sync(updated_at, &signature)
    }

    fn restore(&self, prior: &BTreeMap<String, Option<String>>) {
        for (key, value) in prior {
            let restored = match value {
                Some(value) => self.store.set(key, value),
                None => self.store.remove(key),
            };
            if let Err(e) = restored {
                tracing::error!(key = %key, error = %e, "Could not restore key");
            }
        }
    }

    fn compute_local_snapshot(&self) -> Result<Snapshot, StoreError> {
        let values = self.local_values()?;
        let updated_at = next_push_timestamp(Timestamp::now(), self.last_synced_at()?);
        Ok(Snapshot::new(
            updated_at,
            self.device_id,
            self.config.app_version.as_str(),
            values,
        ))
    }

    fn local_values(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let keys = self.store.keys()?;
        let mut values = BTreeMap::new();
        for key in self.config.keys.filter(&keys) {
            if let Some(value) = self.store.get(&key)? {
                values.insert(key, value);
            }
        }
        Ok(values)
    }

    fn last_synced_at(&self) -> Result<Timestamp, StoreError> {
        Ok(self
            .store
            .get(LAST_SYNCED_AT_KEY)?
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(Timestamp::from_millis)
            .unwrap_or(Timestamp::ZERO))
    }

    fn last_signature(&self) -> Result<Option<Signature>, StoreError> {
        Ok(self
            .store
            .get(LAST_SIGNATURE_KEY)?
            .map(Signature::from_stored))
    }

    fn record_sync(&self, updated_at: Timestamp, signature: &Signature) -> Result<(), StoreError> {
        self.store
            .set(LAST_SYNCED_AT_KEY, &updated_at.as_millis().to_string())?;
        self.store.set(LAST_SIGNATURE_KEY, signature.as_str())
    }
}

async fn next_change(subscription: &mut Option<Subscription>) -> Option<RemoteRow> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;
    use sync_core::TrackedKeySpec;
    use sync_types::SpaceId;

    fn space() -> SpaceId {
        SpaceId::new("shop").unwrap()
    }

    fn config() -> EngineConfig {
        let keys = TrackedKeySpec::new(["inventory."], ["inventory.ui_prefs"]).unwrap();
        EngineConfig::new(space(), "1.0.0", keys).with_poll_interval(Duration::from_millis(20))
    }

    fn engine(store: &MemoryStore, backend: &MockBackend) -> SyncEngine {
        SyncEngine::new(
            Arc::new(store.clone()),
            Some(Arc::new(backend.clone())),
            config(),
            StateEvents::new(),
        )
        .unwrap()
    }

    fn remote_snapshot(updated_at: i64, values: &[(&str, &str)]) -> Snapshot {
        Snapshot::new(
            Timestamp::from_millis(updated_at),
            DeviceId::random(),
            "1.0.0",
            values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn tracked(store: &MemoryStore) -> BTreeMap<String, String> {
        store
            .dump()
            .into_iter()
            .filter(|(k, _)| k.starts_with("inventory."))
            .collect()
    }

    #[tokio::test]
    async fn inert_without_backend() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let engine =
            SyncEngine::new(Arc::new(store), None, config(), StateEvents::new()).unwrap();

        assert!(!engine.start());
        assert_eq!(engine.push().await, PushOutcome::Disabled);
        assert_eq!(engine.pull().await, PullOutcome::Disabled);
        assert!(!engine.status().enabled);
        engine.stop().await;
    }

    #[tokio::test]
    async fn snapshot_contains_only_tracked_keys() {
        let store = MemoryStore::with_values([
            ("inventory.b", "2"),
            ("inventory.a", "1"),
            ("inventory.ui_prefs", "dark"),
            ("session.pin", "1234"),
        ]);
        let engine = engine(&store, &MockBackend::new());

        let snapshot = engine.compute_local_snapshot().unwrap();
        let keys: Vec<_> = snapshot.values().keys().cloned().collect();
        assert_eq!(keys, vec!["inventory.a", "inventory.b"]);
        assert_eq!(snapshot.updated_by(), engine.device_id());
        assert_eq!(snapshot.app_version(), "1.0.0");
    }

    #[tokio::test]
    async fn push_twice_writes_once() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let backend = MockBackend::new();
        let engine = engine(&store, &backend);

        assert!(matches!(engine.push().await, PushOutcome::Pushed { keys: 1, .. }));
        assert_eq!(engine.push().await, PushOutcome::Unchanged);
        assert_eq!(backend.upsert_count(), 1);

        store.set("inventory.a", "2").unwrap();
        assert!(matches!(engine.push().await, PushOutcome::Pushed { .. }));
        assert_eq!(backend.upsert_count(), 2);
    }

    #[tokio::test]
    async fn push_timestamps_strictly_increase() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let engine = engine(&store, &MockBackend::new());
        // Last sync far in the future, as if the clock had jumped back.
        let future = Timestamp::now().as_millis() + 60_000;
        store
            .set(LAST_SYNCED_AT_KEY, &future.to_string())
            .unwrap();

        let PushOutcome::Pushed { updated_at, .. } = engine.push().await else {
            panic!("expected push");
        };
        assert_eq!(updated_at, Timestamp::from_millis(future + 1));
    }

    #[tokio::test]
    async fn failed_push_is_retried() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let backend = MockBackend::new();
        let engine = engine(&store, &backend);

        backend.fail_next_upsert("offline");
        assert!(matches!(engine.push().await, PushOutcome::Failed(_)));
        assert_eq!(engine.status().last_synced_at, Timestamp::ZERO);
        assert_eq!(engine.status().last_signature, None);

        assert!(matches!(engine.push().await, PushOutcome::Pushed { .. }));
        assert_eq!(backend.upsert_count(), 1);
    }

    #[tokio::test]
    async fn push_suppressed_while_applying() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let backend = MockBackend::new();
        let engine = engine(&store, &backend);

        engine.inner.applying_remote.store(true, Ordering::SeqCst);
        assert_eq!(engine.push().await, PushOutcome::Suppressed);
        assert_eq!(backend.upsert_count(), 0);
    }

    #[tokio::test]
    async fn pull_adds_missing_keys() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let backend = MockBackend::new();
        let engine = engine(&store, &backend);
        let remote = remote_snapshot(100, &[("inventory.a", "1"), ("inventory.b", "2")]);
        backend.inject_row(RemoteRow::from_snapshot(&space(), &remote), false);

        assert_eq!(
            engine.pull().await,
            PullOutcome::Applied {
                updated_at: Timestamp::from_millis(100),
                written: 1,
                removed: 0,
            }
        );
        assert_eq!(tracked(&store), remote.values().clone());
        // The applied state counts as synced.
        assert_eq!(engine.push().await, PushOutcome::Unchanged);
    }

    #[tokio::test]
    async fn pull_removes_keys_absent_remotely() {
        let store = MemoryStore::with_values([
            ("inventory.a", "1"),
            ("inventory.gone", "x"),
            ("inventory.ui_prefs", "dark"),
        ]);
        let backend = MockBackend::new();
        let engine = engine(&store, &backend);
        let remote = remote_snapshot(100, &[("inventory.a", "1")]);
        backend.inject_row(RemoteRow::from_snapshot(&space(), &remote), false);

        assert!(matches!(engine.pull().await, PullOutcome::Applied { removed: 1, .. }));
        assert_eq!(store.get("inventory.gone").unwrap(), None);
        // Excluded keys are never touched.
        assert_eq!(store.get("inventory.ui_prefs").unwrap().as_deref(), Some("dark"));
    }

    #[tokio::test]
    async fn pull_skips_equal_or_older_snapshots() {
        let store = MemoryStore::with_values([("inventory.a", "1"), (LAST_SYNCED_AT_KEY, "100")]);
        let backend = MockBackend::new();
        let engine = engine(&store, &backend);

        let remote = remote_snapshot(100, &[("inventory.a", "other")]);
        backend.inject_row(RemoteRow::from_snapshot(&space(), &remote), false);
        assert_eq!(engine.pull().await, PullOutcome::NotNewer);

        let remote = remote_snapshot(50, &[("inventory.a", "older")]);
        backend.inject_row(RemoteRow::from_snapshot(&space(), &remote), false);
        assert_eq!(engine.pull().await, PullOutcome::NotNewer);

        assert_eq!(store.get("inventory.a").unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn pull_ignores_missing_and_malformed_rows() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let backend = MockBackend::new();
        let engine = engine(&store, &backend);

        assert_eq!(engine.pull().await, PullOutcome::NoSnapshot);

        backend.inject_row(
            RemoteRow {
                id: space(),
                payload: json!({"updatedAt": 100, "values": {"inventory.a": 7}}),
                updated_at: "1970-01-01T00:00:00.100Z".into(),
            },
            false,
        );
        assert_eq!(engine.pull().await, PullOutcome::Malformed);
        assert_eq!(store.get("inventory.a").unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn pull_failures_are_contained() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let backend = MockBackend::new();
        let engine = engine(&store, &backend);
        let remote = remote_snapshot(100, &[("inventory.a", "2")]);
        backend.inject_row(RemoteRow::from_snapshot(&space(), &remote), false);

        backend.fail_next_select("timeout");
        assert!(matches!(engine.pull().await, PullOutcome::Failed(_)));

        store.fail_next_write("disk full");
        assert!(matches!(engine.pull().await, PullOutcome::Failed(_)));
        assert!(!engine.inner.applying_remote.load(Ordering::SeqCst));
        assert_eq!(engine.status().last_synced_at, Timestamp::ZERO);

        assert!(matches!(engine.pull().await, PullOutcome::Applied { .. }));
        assert_eq!(store.get("inventory.a").unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn failed_apply_rolls_back_and_holds_push() {
        let store = MemoryStore::with_values([("inventory.x", "0"), ("inventory.y", "0")]);
        let backend = MockBackend::new();
        let engine = engine(&store, &backend);
        assert!(matches!(engine.push().await, PushOutcome::Pushed { .. }));
        let synced = engine.status();

        let remote = remote_snapshot(
            synced.last_synced_at.as_millis() + 1_000,
            &[("inventory.x", "1"), ("inventory.y", "1")],
        );
        backend.inject_row(RemoteRow::from_snapshot(&space(), &remote), false);

        // x is written, then y fails.
        store.fail_write_to("inventory.y", "disk full");
        assert!(matches!(engine.pull().await, PullOutcome::Failed(_)));
        assert_eq!(
            tracked(&store),
            BTreeMap::from([
                ("inventory.x".to_string(), "0".to_string()),
                ("inventory.y".to_string(), "0".to_string()),
            ])
        );
        assert_eq!(engine.status().last_synced_at, synced.last_synced_at);
        assert_eq!(engine.status().last_signature, synced.last_signature);

        // A local edit made meanwhile must not overwrite the newer remote.
        store.set("inventory.z", "5").unwrap();
        assert_eq!(engine.push().await, PushOutcome::Suppressed);
        assert_eq!(backend.upsert_count(), 1);
        let row = backend.row(&space()).unwrap();
        assert_eq!(row.snapshot().unwrap().updated_at(), remote.updated_at());

        assert!(matches!(engine.pull().await, PullOutcome::Applied { .. }));
        assert_eq!(&tracked(&store), remote.values());
        assert_eq!(engine.push().await, PushOutcome::Unchanged);
    }

    #[tokio::test]
    async fn push_in_flight_at_stop_is_discarded() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let backend = MockBackend::new();
        let engine = Arc::new(engine(&store, &backend));
        let gate = backend.hold_next_upsert();

        let push = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.push().await }
        });
        gate.entered().await;
        engine.stop().await;
        gate.release();

        assert_eq!(push.await.unwrap(), PushOutcome::Stopped);
        assert_eq!(store.get(LAST_SYNCED_AT_KEY).unwrap(), None);
        assert_eq!(store.get(LAST_SIGNATURE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn pull_in_flight_at_stop_is_discarded() {
        let store = MemoryStore::with_values([("inventory.a", "1"), (LAST_SYNCED_AT_KEY, "50")]);
        let backend = MockBackend::new();
        let engine = Arc::new(engine(&store, &backend));
        let remote = remote_snapshot(100, &[("inventory.a", "2")]);
        backend.inject_row(RemoteRow::from_snapshot(&space(), &remote), false);
        let gate = backend.hold_next_select();

        let pull = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.pull().await }
        });
        gate.entered().await;
        engine.stop().await;
        gate.release();

        assert_eq!(pull.await.unwrap(), PullOutcome::Stopped);
        assert_eq!(backend.select_count(), 1);
        assert_eq!(store.get("inventory.a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get(LAST_SYNCED_AT_KEY).unwrap().as_deref(), Some("50"));
        assert_eq!(store.get(LAST_SIGNATURE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn applied_pull_emits_event() {
        let store = MemoryStore::new();
        let backend = MockBackend::new();
        let engine = engine(&store, &backend);
        let mut events = engine.subscribe();
        let remote = remote_snapshot(100, &[("inventory.a", "1")]);
        backend.inject_row(RemoteRow::from_snapshot(&space(), &remote), false);

        engine.pull().await;

        assert_eq!(
            events.recv().await.unwrap(),
            StateChange::RemoteApplied {
                updated_at: Timestamp::from_millis(100),
                updated_by: remote.updated_by(),
            }
        );
    }

    #[tokio::test]
    async fn own_notification_is_an_echo() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let backend = MockBackend::new();
        let engine = engine(&store, &backend);
        engine.push().await;

        let row = backend.row(&space()).unwrap();
        assert_eq!(engine.on_remote_change(&row).await, PullOutcome::Echo);
        assert_eq!(backend.select_count(), 0);
    }

    #[tokio::test]
    async fn signature_survives_restart() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let backend = MockBackend::new();

        let first = engine(&store, &backend);
        assert!(matches!(first.push().await, PushOutcome::Pushed { .. }));
        drop(first);

        let second = engine(&store, &backend);
        assert_eq!(second.push().await, PushOutcome::Unchanged);
        assert_eq!(backend.upsert_count(), 1);
    }

    #[tokio::test]
    async fn start_and_stop_lifecycle() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let backend = MockBackend::new();
        let engine = engine(&store, &backend);

        assert!(engine.start());
        assert!(!engine.start());
        assert!(engine.status().running);

        engine.stop().await;
        assert!(!engine.status().running);
        assert!(!engine.start());

        // The final round pushed the local state.
        let row = backend.row(&space()).unwrap();
        assert_eq!(row.snapshot().unwrap().values(), &tracked(&store));

        // Torn down: further calls are ignored.
        store.set("inventory.a", "2").unwrap();
        assert_eq!(engine.push().await, PushOutcome::Stopped);
        assert_eq!(engine.pull().await, PullOutcome::Stopped);
    }

    #[tokio::test]
    async fn zero_poll_interval_still_runs() {
        let store = MemoryStore::with_values([("inventory.a", "1")]);
        let backend = MockBackend::polling_only();
        let mut config = config();
        config.poll_interval = Duration::ZERO;
        let engine = SyncEngine::new(
            Arc::new(store.clone()),
            Some(Arc::new(backend.clone())),
            config,
            StateEvents::new(),
        )
        .unwrap();

        assert!(engine.start());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(engine.status().running);
        assert_eq!(backend.upsert_count(), 1);
        assert!(backend.select_count() > 1);

        engine.stop().await;
    }

    #[tokio::test]
    async fn running_engine_applies_notifications() {
        let store = MemoryStore::new();
        let backend = MockBackend::new();
        let engine = SyncEngine::new(
            Arc::new(store.clone()),
            Some(Arc::new(backend.clone())),
            config().with_poll_interval(Duration::from_secs(3600)),
            StateEvents::new(),
        )
        .unwrap();
        let mut events = engine.subscribe();
        engine.start();
        // Let the task subscribe and run its first tick.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let remote = remote_snapshot(Timestamp::now().as_millis() + 1_000, &[("inventory.z", "9")]);
        backend.inject_row(RemoteRow::from_snapshot(&space(), &remote), true);

        let change = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("no state change")
            .unwrap();
        assert!(matches!(change, StateChange::RemoteApplied { .. }));
        assert_eq!(store.get("inventory.z").unwrap().as_deref(), Some("9"));

        engine.stop().await;
    }

    #[tokio::test]
    async fn subscription_failure_falls_back_to_polling() {
        let store = MemoryStore::new();
        let backend = MockBackend::new();
        backend.fail_next_subscribe("realtime down");
        let engine = engine(&store, &backend);
        let mut events = engine.subscribe();
        engine.start();

        let remote = remote_snapshot(Timestamp::now().as_millis() + 1_000, &[("inventory.p", "1")]);
        backend.inject_row(RemoteRow::from_snapshot(&space(), &remote), false);

        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("poll did not apply")
            .unwrap();
        assert_eq!(store.get("inventory.p").unwrap().as_deref(), Some("1"));

        engine.stop().await;
    }
}
