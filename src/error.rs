//! Unified error type for the chart-cache library.
//!
//! Most store operations absorb failures into `Option`/`bool`/[`SaveFailure`]
//! results. [`Error`] is what remains: canonical write failures, which are
//! deliberately surfaced so a caller persisting identity data cannot miss
//! them, plus configuration and I/O errors from the outer layers.
//!
//! [`SaveFailure`]: crate::store::SaveFailure

use thiserror::Error;

use crate::config::ConfigError;
use crate::keys::CanonicalKey;
use crate::storage::StorageError;

/// Error type for all chart-cache operations that can fail loudly.
#[derive(Error, Debug)]
pub enum Error {
    /// A canonical key could not be written. All canonical keys were
    /// cleared before this error was returned.
    #[error("failed to write canonical key '{}': {source}", key.as_str())]
    Write {
        key: CanonicalKey,
        #[source]
        source: StorageError,
    },

    /// Storage error outside the canonical write path.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A [`Result`] type alias using the unified [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` if this is a canonical write failure.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }

    /// Returns `true` if the underlying cause is an exhausted storage quota.
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            Self::Write { source, .. } | Self::Storage(source) => source.is_quota_exceeded(),
            _ => false,
        }
    }
}
