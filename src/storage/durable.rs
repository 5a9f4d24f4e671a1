//! Durable storage scope backed by fjall.

use std::path::Path;
use std::sync::Arc;

use fjall::{Keyspace, KeyspaceCreateOptions, PersistMode};

use crate::logging::{debug, info, trace};

use super::{StorageError, StorageScope};

/// A `localStorage`-like scope persisted in a fjall keyspace.
///
/// Several scopes can share one database directory through
/// [`sibling`](Self::sibling); each maps to its own keyspace. Every write
/// is synced before returning, so a preference survives a crash right
/// after `set` returns.
///
/// # Example
///
/// ```ignore
/// use chart_cache::storage::FjallScope;
///
/// let preferences = FjallScope::open(".chart-cache", "preferences")?;
/// let session = preferences.sibling("session")?;
/// ```
pub struct FjallScope {
    name: String,
    db: Arc<fjall::Database>,
    keyspace: Keyspace,
}

impl FjallScope {
    /// Open (creating if needed) the database at `path` and the keyspace `name`.
    pub fn open(path: impl AsRef<Path>, name: &str) -> Result<Self, StorageError> {
        let path = path.as_ref();
        debug!(path = %path.display(), scope = name, "opening durable scope");

        let db = fjall::Database::builder(path).open()?;
        let scope = Self::from_database(Arc::new(db), name)?;

        info!(path = %path.display(), scope = name, "durable scope opened");
        Ok(scope)
    }

    /// Open another keyspace of the same database as a separate scope.
    pub fn sibling(&self, name: &str) -> Result<Self, StorageError> {
        Self::from_database(Arc::clone(&self.db), name)
    }

    fn from_database(db: Arc<fjall::Database>, name: &str) -> Result<Self, StorageError> {
        let keyspace = db.keyspace(name, KeyspaceCreateOptions::default)?;
        Ok(Self {
            name: name.to_string(),
            db,
            keyspace,
        })
    }

    fn persist(&self) -> Result<(), StorageError> {
        self.db.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

impl StorageScope for FjallScope {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let Some(bytes) = self.keyspace.get(key)? else {
            return Ok(None);
        };
        let value = String::from_utf8(bytes.to_vec())
            .map_err(|_| StorageError::Encoding(key.to_string()))?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        trace!(scope = %self.name, key = key, bytes = value.len(), "durable write");
        self.keyspace.insert(key, value.as_bytes())?;
        self.persist()
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.keyspace.remove(key)?;
        self.persist()
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        // Skip any keys that fail to read
        Ok(self
            .keyspace
            .iter()
            .filter_map(|kv| kv.key().ok())
            .map(|k| String::from_utf8_lossy(&k).into_owned())
            .collect())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .keyspace
            .prefix(prefix)
            .filter_map(|kv| kv.key().ok())
            .map(|k| String::from_utf8_lossy(&k).into_owned())
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let scope = FjallScope::open(dir.path(), "preferences").unwrap();
            scope.set("jyotish_shastra_data_theme", "\"dark\"").unwrap();
        }

        let scope = FjallScope::open(dir.path(), "preferences").unwrap();
        assert_eq!(
            scope.get("jyotish_shastra_data_theme").unwrap().as_deref(),
            Some("\"dark\"")
        );
    }

    #[test]
    fn test_siblings_are_isolated() {
        let dir = TempDir::new().unwrap();
        let prefs = FjallScope::open(dir.path(), "preferences").unwrap();
        let session = prefs.sibling("session").unwrap();

        session.set("btr:v2:chartId", "chart-1").unwrap();
        assert_eq!(prefs.get("btr:v2:chartId").unwrap(), None);
        assert_eq!(session.keys().unwrap(), vec!["btr:v2:chartId".to_string()]);
    }

    #[test]
    fn test_prefix_listing() {
        let dir = TempDir::new().unwrap();
        let scope = FjallScope::open(dir.path(), "preferences").unwrap();
        scope.set("jyotish_shastra_data_a", "1").unwrap();
        scope.set("jyotish_shastra_data_b", "2").unwrap();
        scope.set("unrelated", "3").unwrap();

        let keys = scope.keys_with_prefix("jyotish_shastra_data_").unwrap();
        assert_eq!(keys.len(), 2);

        scope.remove("jyotish_shastra_data_a").unwrap();
        assert_eq!(scope.usage().unwrap().entries, 2);
    }
}
