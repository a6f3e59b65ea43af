//! Engine configuration and remote connection parameters.

use crate::backend::HttpBackend;
use std::time::Duration;
use sync_core::TrackedKeySpec;
use sync_types::SpaceId;

/// Default interval between pull/push rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// Shortest interval the engine will tick at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Synchronization space shared by all devices of one installation.
    pub space: SpaceId,
    /// Application version stamped on every pushed snapshot.
    pub app_version: String,
    /// Interval between pull/push rounds. Values below
    /// [`MIN_POLL_INTERVAL`] are raised to it when the engine runs.
    pub poll_interval: Duration,
    /// Which keys are replicated.
    pub keys: TrackedKeySpec,
}

impl EngineConfig {
    /// Create a configuration with the default poll interval.
    pub fn new(space: SpaceId, app_version: &str, keys: TrackedKeySpec) -> Self {
        Self {
            space,
            app_version: app_version.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            keys,
        }
    }

    /// Set the poll interval. Zero is bumped to one millisecond.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// The interval the engine actually ticks at.
    pub fn tick_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }
}

/// Connection parameters for the REST remote.
#[derive(Debug, Clone, Default)]
pub struct RemoteParams {
    /// Endpoint URL.
    pub url: Option<String>,
    /// Access credential.
    pub api_key: Option<String>,
    /// Table holding the snapshot rows.
    pub table: String,
}

impl RemoteParams {
    /// Build the backend, or `None` when sync should stay disabled.
    ///
    /// Missing parameters are a normal mode and logged at info. Parameters
    /// that are present but unusable are logged at warn.
    pub fn connect(&self) -> Option<HttpBackend> {
        let url = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty());
        let key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        match (url, key) {
            (None, None) => {
                tracing::info!("No remote configured, sync disabled");
                None
            }
            (Some(_), None) => {
                tracing::warn!("Remote URL set without a credential, sync disabled");
                None
            }
            (None, Some(_)) => {
                tracing::warn!("Remote credential set without a URL, sync disabled");
                None
            }
            (Some(url), Some(key)) => match HttpBackend::new(url, key, &self.table) {
                Ok(backend) => Some(backend),
                Err(e) => {
                    tracing::warn!(error = %e, "Remote parameters unusable, sync disabled");
                    None
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(url: Option<&str>, key: Option<&str>) -> RemoteParams {
        RemoteParams {
            url: url.map(String::from),
            api_key: key.map(String::from),
            table: "app_state".into(),
        }
    }

    #[test]
    fn engine_config_defaults() {
        let keys = TrackedKeySpec::new(["inventory."], Vec::<String>::new()).unwrap();
        let config = EngineConfig::new(SpaceId::new("shop").unwrap(), "1.2.3", keys);

        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.app_version, "1.2.3");

        let config = config.with_poll_interval(Duration::ZERO);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn zero_interval_field_still_ticks() {
        let keys = TrackedKeySpec::new(["inventory."], Vec::<String>::new()).unwrap();
        let mut config = EngineConfig::new(SpaceId::new("shop").unwrap(), "1.2.3", keys);

        config.poll_interval = Duration::ZERO;
        assert_eq!(config.tick_interval(), MIN_POLL_INTERVAL);

        config.poll_interval = Duration::from_secs(3);
        assert_eq!(config.tick_interval(), Duration::from_secs(3));
    }

    #[test]
    fn absent_or_partial_params_disable_sync() {
        assert!(params(None, None).connect().is_none());
        assert!(params(Some("https://db.example.com"), None).connect().is_none());
        assert!(params(None, Some("key")).connect().is_none());
        assert!(params(Some("  "), Some("key")).connect().is_none());
    }

    #[test]
    fn malformed_url_disables_sync() {
        assert!(params(Some("::nope::"), Some("key")).connect().is_none());
    }

    #[test]
    fn complete_params_connect() {
        let backend = params(Some("https://db.example.com"), Some("key"))
            .connect()
            .unwrap();
        assert_eq!(
            backend.table_url().as_str(),
            "https://db.example.com/rest/v1/app_state"
        );
    }
}
