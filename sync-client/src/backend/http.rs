//! REST remote backend.
//!
//! Talks to a PostgREST-style table over HTTPS: one JSON row per space,
//! upserted with `Prefer: resolution=merge-duplicates`.

use super::{RemoteBackend, RemoteError, Subscription};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde_json::{json, Value};
use std::time::Duration;
use sync_types::{RemoteRow, SpaceId, Timestamp};

/// Upper bound on any single request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Malformed(e.to_string())
        } else {
            RemoteError::Unavailable(e.to_string())
        }
    }
}

/// Remote backend over a REST table endpoint.
///
/// Offers no realtime channel; an engine using it relies on polling.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    table_url: Url,
}

impl HttpBackend {
    /// Create a backend for `table` at `url`, authenticating with `api_key`.
    ///
    /// Fails with [`RemoteError::Malformed`] when the URL is not an absolute
    /// http(s) URL or the credential or table name is empty.
    pub fn new(url: &str, api_key: &str, table: &str) -> Result<Self, RemoteError> {
        let mut base = Url::parse(url.trim())
            .map_err(|e| RemoteError::Malformed(format!("invalid remote url {url:?}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(RemoteError::Malformed(format!(
                "remote url must be http(s): {url:?}"
            )));
        }
        if api_key.trim().is_empty() {
            return Err(RemoteError::Malformed("empty remote credential".into()));
        }
        if table.trim().is_empty() || table.contains('/') {
            return Err(RemoteError::Malformed(format!("invalid table name {table:?}")));
        }

        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let table_url = base
            .join(&format!("rest/v1/{table}"))
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|_| RemoteError::Malformed("credential is not a valid header".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| RemoteError::Malformed("credential is not a valid header".into()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        Ok(Self { http, table_url })
    }

    /// Endpoint of the table.
    pub fn table_url(&self) -> &Url {
        &self.table_url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    async fn upsert(
        &self,
        space: &SpaceId,
        payload: Value,
        updated_at: Timestamp,
    ) -> Result<(), RemoteError> {
        let body = json!([{
            "id": space.as_str(),
            "payload": payload,
            "updated_at": updated_at.to_rfc3339(),
        }]);
        let response = self
            .http
            .post(self.table_url.clone())
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn select_one(&self, space: &SpaceId) -> Result<Option<RemoteRow>, RemoteError> {
        let response = self
            .http
            .get(self.table_url.clone())
            .query(&[("id", format!("eq.{space}")), ("select", "*".to_string())])
            .send()
            .await?;
        let rows: Vec<Value> = Self::check(response).await?.json().await?;

        match rows.into_iter().next() {
            None => Ok(None),
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| RemoteError::Malformed(e.to_string())),
        }
    }

    async fn subscribe(&self, _space: &SpaceId) -> Result<Subscription, RemoteError> {
        Err(RemoteError::Unsupported("realtime notifications over REST"))
    }
}
