//! Configuration loading for the stockroom CLI.
//!
//! Configuration is read from a TOML file (`--config`, or `stockroom.toml`
//! in the data directory when present) and then overridden from the
//! environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sync_client::{EngineConfig, RemoteParams};
use sync_core::{KeySpecError, TrackedKeySpec};
use sync_remote::sqlite::DEFAULT_TABLE;
use sync_types::{SpaceId, TypesError};

/// File name looked up in the data directory when `--config` is not given.
pub const CONFIG_FILE: &str = "stockroom.toml";

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Where local state lives (default: platform data directory).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Version stamped on pushed snapshots.
    #[serde(default = "default_app_version")]
    pub app_version: String,
    /// Remote connection.
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Sync behavior.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Remote connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// REST endpoint.
    pub url: Option<String>,
    /// REST credential.
    pub api_key: Option<String>,
    /// Shared SQLite file, used instead of the REST endpoint when set.
    pub sqlite: Option<PathBuf>,
    /// Table holding snapshot rows (default: `app_state`).
    #[serde(default = "default_table")]
    pub table: String,
    /// Synchronization space (default: `default`).
    #[serde(default = "default_space")]
    pub space: String,
}

/// Sync behavior configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Interval between pull/push rounds in milliseconds (default: 2500).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Namespaces that are replicated.
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,
    /// Keys under those namespaces that stay device-local.
    #[serde(default = "default_exclusions")]
    pub exclusions: Vec<String>,
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_space() -> String {
    "default".to_string()
}

fn default_interval_ms() -> u64 {
    2500
}

fn default_prefixes() -> Vec<String> {
    ["inventory.", "category.", "location.", "job."]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_exclusions() -> Vec<String> {
    ["inventory.ui_prefs", "job.session"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            app_version: default_app_version(),
            remote: RemoteConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            sqlite: None,
            table: default_table(),
            space: default_space(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            prefixes: default_prefixes(),
            exclusions: default_exclusions(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load `explicit` if given, else `fallback` if it exists, else defaults.
    pub fn locate(explicit: Option<&Path>, fallback: &Path) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None if fallback.is_file() => Self::from_file(fallback),
            None => Ok(Self::default()),
        }
    }

    /// Apply `STOCKROOM_*` overrides looked up through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("STOCKROOM_REMOTE_URL") {
            self.remote.url = Some(url);
        }
        if let Some(key) = var("STOCKROOM_REMOTE_KEY") {
            self.remote.api_key = Some(key);
        }
        if let Some(path) = var("STOCKROOM_REMOTE_SQLITE") {
            self.remote.sqlite = Some(PathBuf::from(path));
        }
        if let Some(table) = var("STOCKROOM_REMOTE_TABLE") {
            self.remote.table = table;
        }
        if let Some(space) = var("STOCKROOM_SPACE") {
            self.remote.space = space;
        }
        if let Some(value) = var("STOCKROOM_SYNC_INTERVAL_MS") {
            self.sync.interval_ms =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidOverride {
                        var: "STOCKROOM_SYNC_INTERVAL_MS",
                        value,
                    })?;
        }
        Ok(())
    }

    /// The tracked key set.
    pub fn key_spec(&self) -> Result<TrackedKeySpec, ConfigError> {
        Ok(TrackedKeySpec::new(
            self.sync.prefixes.iter().cloned(),
            self.sync.exclusions.iter().cloned(),
        )?)
    }

    /// Engine configuration derived from this file.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let space = SpaceId::new(self.remote.space.clone())?;
        Ok(
            EngineConfig::new(space, &self.app_version, self.key_spec()?)
                .with_poll_interval(Duration::from_millis(self.sync.interval_ms)),
        )
    }

    /// REST connection parameters.
    pub fn remote_params(&self) -> RemoteParams {
        RemoteParams {
            url: self.remote.url.clone(),
            api_key: self.remote.api_key.clone(),
            table: self.remote.table.clone(),
        }
    }

    /// Human-readable description of the configured remote.
    pub fn remote_label(&self) -> String {
        match (&self.remote.sqlite, &self.remote.url) {
            (Some(path), _) => format!("sqlite {}", path.display()),
            (None, Some(url)) => format!("rest {url}"),
            (None, None) => "none".to_string(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// An environment override could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidOverride {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
    /// The tracked key set is invalid.
    #[error("invalid sync keys: {0}")]
    Keys(#[from] KeySpecError),
    /// The space id is invalid.
    #[error("invalid space: {0}")]
    Space(#[from] TypesError),
}

/// Default configuration written by `init`.
pub fn template() -> String {
    format!(
        r#"# stockroom configuration
app_version = "{version}"

[remote]
# url = "https://your-project.example.com"
# api_key = "..."
# sqlite = "/path/to/shared.db"
table = "{table}"
space = "{space}"

[sync]
interval_ms = {interval}
prefixes = {prefixes:?}
exclusions = {exclusions:?}
"#,
        version = default_app_version(),
        table = default_table(),
        space = default_space(),
        interval = default_interval_ms(),
        prefixes = default_prefixes(),
        exclusions = default_exclusions(),
    )
}
