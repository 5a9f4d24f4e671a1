//! Scope standing in for storage that does not exist.

use super::{ScopeUsage, StorageError, StorageScope};

/// Every operation fails with [`StorageError::Unavailable`]; the store
/// turns that into `None`/`false` results.
#[derive(Debug, Clone)]
pub struct UnavailableScope {
    name: String,
}

impl UnavailableScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn unavailable(&self) -> StorageError {
        StorageError::Unavailable(self.name.clone())
    }
}

impl StorageScope for UnavailableScope {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        false
    }

    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(self.unavailable())
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(self.unavailable())
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(self.unavailable())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Err(self.unavailable())
    }

    fn usage(&self) -> Result<ScopeUsage, StorageError> {
        Err(self.unavailable())
    }
}
