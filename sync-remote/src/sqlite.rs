//! SQLite remote backend.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use sync_client::{ChangeFeed, RemoteBackend, RemoteError, Subscription};
use sync_types::{RemoteRow, SpaceId, Timestamp};

/// Default table name, shared with the REST layout.
pub const DEFAULT_TABLE: &str = "app_state";

/// SQLite-backed remote: one row per space in one table.
///
/// Uses WAL mode so several processes can share the file.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    table: String,
    feed: Arc<ChangeFeed>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("table", &self.table)
            .finish()
    }
}

impl SqliteBackend {
    /// Open (or create) the database at `path` with the given table.
    pub async fn new(path: &Path, table: &str) -> StorageResult<Self> {
        let table = validate_table(table)?;
        let url = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let backend = Self {
            pool,
            table,
            feed: Arc::new(ChangeFeed::new()),
        };
        backend.run_migrations().await?;
        tracing::debug!(path = %path.display(), table = %backend.table, "Opened SQLite remote");
        Ok(backend)
    }

    /// Create an in-memory backend (for testing).
    pub async fn in_memory(table: &str) -> StorageResult<Self> {
        let table = validate_table(table)?;
        let options = SqliteConnectOptions::from_str(":memory:")?;

        // One connection: every connection to :memory: is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let backend = Self {
            pool,
            table,
            feed: Arc::new(ChangeFeed::new()),
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Table holding the rows.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Ids of every space with a row, sorted.
    pub async fn spaces(&self) -> StorageResult<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar(&format!("SELECT id FROM {} ORDER BY id", self.table))
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            self.table
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_row(&self, row: &RemoteRow) -> StorageResult<()> {
        let payload = serde_json::to_string(&row.payload)?;
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, payload, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            self.table
        ))
        .bind(row.id.as_str())
        .bind(payload)
        .bind(&row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_row(&self, space: &SpaceId) -> StorageResult<Option<RemoteRow>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT payload, updated_at FROM {} WHERE id = ?1",
            self.table
        ))
        .bind(space.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.into_remote(space)))
    }
}

#[async_trait]
impl RemoteBackend for SqliteBackend {
    async fn upsert(
        &self,
        space: &SpaceId,
        payload: Value,
        updated_at: Timestamp,
    ) -> Result<(), RemoteError> {
        let row = RemoteRow {
            id: space.clone(),
            payload,
            updated_at: updated_at.to_rfc3339(),
        };
        self.write_row(&row).await?;
        let notified = self.feed.publish(row);
        tracing::trace!(space = %space, notified, "Stored snapshot row");
        Ok(())
    }

    async fn select_one(&self, space: &SpaceId) -> Result<Option<RemoteRow>, RemoteError> {
        Ok(self.read_row(space).await?)
    }

    async fn subscribe(&self, space: &SpaceId) -> Result<Subscription, RemoteError> {
        Ok(self.feed.subscribe(space))
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    payload: String,
    updated_at: String,
}

impl SnapshotRow {
    /// Stored text that is not JSON is handed on as a JSON string, which no
    /// snapshot decoder accepts.
    fn into_remote(self, space: &SpaceId) -> RemoteRow {
        let payload = serde_json::from_str(&self.payload).unwrap_or(Value::String(self.payload));
        RemoteRow {
            id: space.clone(),
            payload,
            updated_at: self.updated_at,
        }
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_table(table: &str) -> StorageResult<String> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(table.to_string())
    } else {
        Err(StorageError::InvalidTable(table.to_string()))
    }
}
