//! CLI command implementations.

pub mod history;
pub mod init;
pub mod keys;
pub mod pull;
pub mod push;
pub mod status;
pub mod watch;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sync_client::{AuditLog, FileStore, RemoteBackend, StateEvents, StateStore, SyncEngine};
use sync_remote::SqliteBackend;
use sync_types::Timestamp;

use crate::config::Config;

/// File holding the local key-value state.
pub const STATE_FILE: &str = "state.json";

/// Local state and configuration shared by every command.
pub struct Session {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Effective configuration.
    pub config: Config,
    /// Local state.
    pub store: Arc<FileStore>,
    /// Change hub shared by the audit log and the engine.
    pub events: StateEvents,
}

impl Session {
    /// Open an initialized data directory.
    pub fn open(data_dir: &Path, config: Config) -> Result<Self> {
        let path = data_dir.join(STATE_FILE);
        if !path.is_file() {
            anyhow::bail!("Not initialized. Run 'stockroom init' first.");
        }
        let store = FileStore::open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            store: Arc::new(store),
            events: StateEvents::new(),
        })
    }

    /// The audit log over the local state.
    pub fn audit(&self) -> Result<AuditLog> {
        AuditLog::open(self.store(), self.events.clone()).context("Failed to load audit history")
    }

    /// A sync engine over the local state and the configured remote.
    pub async fn engine(&self) -> Result<SyncEngine> {
        let config = self.config.engine_config()?;
        let backend = connect(&self.config).await;
        SyncEngine::new(self.store(), backend, config, self.events.clone())
            .context("Failed to load device identity")
    }

    fn store(&self) -> Arc<dyn StateStore> {
        self.store.clone()
    }
}

/// Build the configured remote, or `None` when sync is disabled.
///
/// A SQLite path wins over a REST endpoint.
pub async fn connect(config: &Config) -> Option<Arc<dyn RemoteBackend>> {
    if let Some(path) = &config.remote.sqlite {
        return match SqliteBackend::new(path, &config.remote.table).await {
            Ok(backend) => Some(Arc::new(backend)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "SQLite remote unusable, sync disabled");
                None
            }
        };
    }
    config
        .remote_params()
        .connect()
        .map(|backend| Arc::new(backend) as Arc<dyn RemoteBackend>)
}

/// Format a timestamp for display.
pub fn format_timestamp(ts: Timestamp) -> String {
    if ts == Timestamp::ZERO {
        "never".to_string()
    } else {
        ts.to_rfc3339()
    }
}
