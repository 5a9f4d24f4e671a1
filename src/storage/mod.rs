//! Storage scopes the session store persists into.
//!
//! A scope is a flat string-to-string key/value area, the same shape as a
//! browser `sessionStorage`/`localStorage`. The store never touches a
//! backend directly; it goes through [`StorageScope`] so that the
//! "storage may not exist" case is one adapter ([`UnavailableScope`])
//! instead of a branch in every operation.

#[cfg(feature = "durable")]
mod durable;
mod memory;
mod unavailable;

#[cfg(feature = "durable")]
pub use durable::FjallScope;
pub use memory::{DEFAULT_QUOTA_BYTES, MemoryScope};
pub use unavailable::UnavailableScope;

use thiserror::Error;

/// Errors raised by a storage scope.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage scope '{0}' is not available")]
    Unavailable(String),

    #[error("quota exceeded writing '{key}': {required} bytes required, {quota} allowed")]
    QuotaExceeded {
        key: String,
        required: usize,
        quota: usize,
    },

    #[error("stored value for '{0}' is not valid UTF-8")]
    Encoding(String),

    #[error("failed to serialize value for '{key}': {reason}")]
    Serialization { key: String, reason: String },

    #[cfg(feature = "durable")]
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Returns `true` for quota exhaustion.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Returns `true` when the scope itself does not exist.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Entry count and approximate byte footprint of a scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ScopeUsage {
    pub entries: usize,
    /// Sum of key and value lengths in bytes.
    pub bytes: usize,
}

/// A synchronous key/value storage area.
///
/// Every call is independent: implementations lock per call at most, and
/// offer no atomicity across calls.
pub trait StorageScope: Send + Sync {
    /// Human-readable scope name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Whether the scope exists at all.
    fn is_available(&self) -> bool {
        true
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All keys currently stored, in ascending order.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Byte budget of the scope, if it has one.
    fn quota(&self) -> Option<usize> {
        None
    }

    fn usage(&self) -> Result<ScopeUsage, StorageError> {
        let mut usage = ScopeUsage::default();
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                usage.entries += 1;
                usage.bytes += key.len() + value.len();
            }
        }
        Ok(usage)
    }

    /// Keys starting with `prefix`, in ascending order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove every key in the scope.
    fn clear(&self) -> Result<(), StorageError> {
        for key in self.keys()? {
            self.remove(&key)?;
        }
        Ok(())
    }
}
