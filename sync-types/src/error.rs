//! Error types for stockroom data model.

use thiserror::Error;

/// Errors that can occur while building or decoding model types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A remote document did not have the shape of a snapshot.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// A device identifier string could not be decoded.
    #[error("invalid device id: {0}")]
    InvalidDeviceId(String),

    /// A space identifier was empty.
    #[error("space id must not be empty")]
    EmptySpaceId,

    /// A timestamp string could not be parsed.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// An action kind string was not recognised.
    #[error("unknown action kind: {0}")]
    UnknownAction(String),

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
