//! In-process storage scope with an optional byte quota.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ScopeUsage, StorageError, StorageScope};

/// Default quota, matching the budget browsers give a storage area.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// A `sessionStorage`-like scope living in memory.
///
/// Data lives exactly as long as the value, which is the lifetime of one
/// visit for the session scope. Writes that would push the sum of key and
/// value lengths past the quota fail with [`StorageError::QuotaExceeded`]
/// and leave the previous value in place.
#[derive(Debug)]
pub struct MemoryScope {
    name: String,
    quota: Option<usize>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryScope {
    /// Create an empty scope with the default 5 MiB quota.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_quota(name, Some(DEFAULT_QUOTA_BYTES))
    }

    /// Create an empty scope with an explicit quota (`None` = unbounded).
    pub fn with_quota(name: impl Into<String>, quota: Option<usize>) -> Self {
        Self {
            name: name.into(),
            quota,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        // A panicking writer cannot leave a half-written map behind: every
        // mutation is a single insert/remove.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn used_bytes(entries: &BTreeMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl StorageScope for MemoryScope {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries();

        if let Some(quota) = self.quota {
            let current = Self::used_bytes(&entries);
            let replaced = entries.get(key).map_or(0, |old| key.len() + old.len());
            let required = current - replaced + key.len() + value.len();
            if required > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    required,
                    quota,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries().keys().cloned().collect())
    }

    fn quota(&self) -> Option<usize> {
        self.quota
    }

    fn usage(&self) -> Result<ScopeUsage, StorageError> {
        let entries = self.entries();
        Ok(ScopeUsage {
            entries: entries.len(),
            bytes: Self::used_bytes(&entries),
        })
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.entries().clear();
        Ok(())
    }
}
