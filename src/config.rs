//! Configuration loaded from TOML.
//!
//! ```toml
//! [store]
//! ttl_secs = 900
//! schema_version = "2"
//! session_quota_bytes = 5242880
//! preference_max_age_days = 30
//!
//! [storage]
//! path = ".chart-cache"
//!
//! [logging]
//! level = "chart_cache=debug"
//! format = "json"
//! output = "stderr"
//! ```
//!
//! Every section and field is optional.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::storage::DEFAULT_QUOTA_BYTES;
use crate::ttl::DEFAULT_TTL;

/// Schema tag written next to every envelope.
pub const CURRENT_SCHEMA_VERSION: &str = "2";

/// Default age after which preference entries are swept.
pub const DEFAULT_PREFERENCE_MAX_AGE_DAYS: u64 = 30;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        content.parse()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(content)?;
        config.store.validate()?;
        Ok(config)
    }
}

/// Behavior of the session store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Envelope lifetime after the last write, in seconds.
    pub ttl_secs: u64,
    /// Schema tag; stored envelopes with another tag are discarded.
    pub schema_version: String,
    /// Byte budget of the in-memory session scope (`None` = unbounded).
    pub session_quota_bytes: Option<usize>,
    /// Preference entries older than this are removed by the expiry sweep.
    pub preference_max_age_days: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL.as_secs(),
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            session_quota_bytes: Some(DEFAULT_QUOTA_BYTES),
            preference_max_age_days: DEFAULT_PREFERENCE_MAX_AGE_DAYS,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    pub fn with_session_quota(mut self, quota: Option<usize>) -> Self {
        self.session_quota_bytes = quota;
        self
    }

    pub fn with_preference_max_age_days(mut self, days: u64) -> Self {
        self.preference_max_age_days = days;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn preference_max_age(&self) -> Duration {
        Duration::from_secs(self.preference_max_age_days.saturating_mul(24 * 60 * 60))
    }

    /// Reject settings the store cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs == 0 {
            return Err(ConfigError::Invalid("store.ttl_secs must be positive".to_string()));
        }
        if self.schema_version.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "store.schema_version must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the CLI keeps its durable scopes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".chart-cache"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings used by binaries that install a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `chart_cache=debug`.
    pub level: String,
    pub format: LogFormat,
    /// `stdout`, `stderr`, or a file path to append to.
    pub output: String,
    pub color: bool,
    pub timestamps: bool,
    /// Include the event target (module path).
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
            output: "stderr".to_string(),
            color: true,
            timestamps: true,
            target: false,
        }
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
