//! Error types for sync-remote.

use std::path::PathBuf;
use sync_client::RemoteError;

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Table name is not a plain identifier.
    #[error("invalid table name: {0:?}")]
    InvalidTable(String),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },

    /// Payload could not be encoded.
    #[error("payload encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<StorageError> for RemoteError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Database(e) => RemoteError::Unavailable(e.to_string()),
            other => RemoteError::Malformed(other.to_string()),
        }
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_are_transient() {
        let err: RemoteError = StorageError::Database(sqlx::Error::PoolClosed).into();
        assert!(matches!(err, RemoteError::Unavailable(_)));
    }

    #[test]
    fn configuration_errors_are_malformed() {
        let err: RemoteError = StorageError::InvalidTable("a;b".into()).into();
        assert!(matches!(err, RemoteError::Malformed(_)));
    }
}
