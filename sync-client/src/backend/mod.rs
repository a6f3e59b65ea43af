//! Remote backend abstraction.
//!
//! A remote backend keeps one snapshot row per synchronization space and,
//! optionally, tells subscribers when that row changes.
//!
//! # Design
//!
//! The trait is async and row-oriented:
//! - `upsert()` writes the space's row (last write wins at the row level)
//! - `select_one()` reads it back
//! - `subscribe()` opens a change feed, or fails with
//!   [`RemoteError::Unsupported`] when the backend only supports polling
//!
//! # Example
//!
//! ```ignore
//! let backend = MockBackend::new();
//! backend.upsert(&space, snapshot.to_document(), snapshot.updated_at()).await?;
//! let row = backend.select_one(&space).await?;
//! ```

mod http;
mod mock;

pub use http::HttpBackend;
pub use mock::{CallGate, MockBackend};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use sync_types::{RemoteRow, SpaceId, Timestamp};
use thiserror::Error;
use tokio::sync::broadcast;

/// Buffered notifications per space before slow subscribers start lagging.
const FEED_CAPACITY: usize = 16;

/// Remote backend errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The backend could not be reached.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The backend answered but refused the request.
    #[error("remote rejected request ({status}): {message}")]
    Rejected {
        /// Backend status code.
        status: u16,
        /// Backend-provided reason.
        message: String,
    },

    /// The backend answered with something that is not a row.
    #[error("malformed remote response: {0}")]
    Malformed(String),

    /// The backend does not offer this operation.
    #[error("unsupported by remote: {0}")]
    Unsupported(&'static str),
}

/// A shared, row-oriented store holding one snapshot row per space.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Insert or replace the row for `space`.
    async fn upsert(
        &self,
        space: &SpaceId,
        payload: Value,
        updated_at: Timestamp,
    ) -> Result<(), RemoteError>;

    /// Read the row for `space`, if any.
    async fn select_one(&self, space: &SpaceId) -> Result<Option<RemoteRow>, RemoteError>;

    /// Subscribe to changes of the row for `space`.
    async fn subscribe(&self, space: &SpaceId) -> Result<Subscription, RemoteError>;
}

/// A live change feed for one space.
///
/// Dropping the subscription releases it.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<RemoteRow>,
}

impl Subscription {
    /// Wrap a broadcast receiver.
    pub fn new(receiver: broadcast::Receiver<RemoteRow>) -> Self {
        Self { receiver }
    }

    /// Wait for the next changed row.
    ///
    /// Returns `None` once the backend has gone away. Missed notifications
    /// are skipped; the caller reads the current row anyway.
    pub async fn next(&mut self) -> Option<RemoteRow> {
        loop {
            match self.receiver.recv().await {
                Ok(row) => return Some(row),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Change feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Per-space notification fan-out for backends that deliver changes
/// in-process.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    senders: Mutex<HashMap<SpaceId, broadcast::Sender<RemoteRow>>>,
}

impl ChangeFeed {
    /// Create an empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a subscription for `space`.
    pub fn subscribe(&self, space: &SpaceId) -> Subscription {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = senders
            .entry(space.clone())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0);
        Subscription::new(sender.subscribe())
    }

    /// Notify every subscriber of `row.id`. Returns how many were reached.
    pub fn publish(&self, row: RemoteRow) -> usize {
        let senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders
            .get(&row.id)
            .and_then(|sender| sender.send(row).ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(space: &str, n: i64) -> RemoteRow {
        RemoteRow {
            id: SpaceId::new(space).unwrap(),
            payload: json!({ "n": n }),
            updated_at: Timestamp::from_millis(n).to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn feed_delivers_only_to_matching_space() {
        let feed = ChangeFeed::new();
        let mut shop = feed.subscribe(&SpaceId::new("shop").unwrap());
        let mut other = feed.subscribe(&SpaceId::new("other").unwrap());

        assert_eq!(feed.publish(row("shop", 1)), 1);

        assert_eq!(shop.next().await.unwrap().payload, json!({ "n": 1 }));
        assert!(other.receiver.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_reaches_nobody() {
        let feed = ChangeFeed::new();
        assert_eq!(feed.publish(row("shop", 1)), 0);
    }

    #[tokio::test]
    async fn lagged_subscription_skips_to_newer_rows() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe(&SpaceId::new("shop").unwrap());

        for n in 0..(FEED_CAPACITY as i64 + 4) {
            feed.publish(row("shop", n));
        }

        let first = sub.next().await.unwrap();
        assert_eq!(first.payload, json!({ "n": 4 }));
    }

    #[tokio::test]
    async fn subscription_ends_when_feed_dropped() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe(&SpaceId::new("shop").unwrap());
        drop(feed);
        assert!(sub.next().await.is_none());
    }
}
