//! The session store: the single owner of every key it writes.
//!
//! `SessionStore` keeps one "current" birth record, the chart id computed
//! for it, and best-effort session data (API responses, analyses) in an
//! ephemeral session scope, plus preferences in a longer-lived scope.
//!
//! # Example
//!
//! ```ignore
//! use chart_cache::{SessionStore, StoreConfig};
//! use serde_json::json;
//!
//! let store = SessionStore::in_memory(StoreConfig::default());
//!
//! let stored = store.set_birth_data(&json!({
//!     "dateOfBirth": "1990-01-01",
//!     "timeOfBirth": "12:00",
//!     "latitude": 19.076,
//!     "longitude": 72.8777,
//!     "timezone": "Asia/Kolkata"
//! }))?;
//! assert!(stored);
//!
//! store.set_chart_id("chart_12345")?;
//! let envelope = store.get_birth_data().expect("fresh envelope");
//! println!("{} saved at {}", envelope.meta.fingerprint, envelope.meta.saved_at_iso);
//! ```
//!
//! # Consistency
//!
//! Canonical writes either land completely or leave no canonical key
//! behind. Nothing here locks across calls: two callers interleaving
//! `set_birth_data` and `set_chart_id` can race, and must be serialized by
//! whoever drives them.

mod canonical;
mod diagnostics;
mod migration;
mod preferences;
mod session;

pub use diagnostics::{
    CleanupOptions, CleanupReport, Diagnostics, IntegrityIssue, IntegrityReport, KeyPresence,
    ScopeReport, TtlStatus,
};
pub use session::{AnalysisKind, LastChart, LoadedSession, SaveFailure, SavedAnalysis, SessionSaved};

#[cfg(feature = "durable")]
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::config::StoreConfig;
use crate::logging::warn;
#[cfg(feature = "durable")]
use crate::storage::FjallScope;
use crate::storage::{MemoryScope, StorageScope, UnavailableScope};
use crate::ttl::{Clock, SystemClock};

/// Validated, TTL-aware persistence of the current birth record and its
/// satellite data.
///
/// Construct one at application start and hand out references; there is
/// no global instance.
pub struct SessionStore {
    session: Arc<dyn StorageScope>,
    preferences: Arc<dyn StorageScope>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    page_load_id: String,
}

impl SessionStore {
    /// Create a store over explicit scopes, using wall-clock time.
    pub fn new(
        session: Arc<dyn StorageScope>,
        preferences: Arc<dyn StorageScope>,
        config: StoreConfig,
    ) -> Self {
        Self {
            session,
            preferences,
            clock: Arc::new(SystemClock),
            config,
            page_load_id: new_page_load_id(),
        }
    }

    /// A store over fresh in-memory scopes. The session scope gets the
    /// configured quota; the preference scope is unbounded.
    pub fn in_memory(config: StoreConfig) -> Self {
        let session = MemoryScope::with_quota("session", config.session_quota_bytes);
        let preferences = MemoryScope::with_quota("preferences", None);
        Self::new(Arc::new(session), Arc::new(preferences), config)
    }

    /// A store over durable scopes in the fjall database at `path`.
    ///
    /// Session and preference data live in separate keyspaces of the same
    /// database. Durable scopes carry no byte quota.
    #[cfg(feature = "durable")]
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> crate::Result<Self> {
        let preferences = FjallScope::open(path, "preferences")?;
        let session = preferences.sibling("session")?;
        Ok(Self::new(Arc::new(session), Arc::new(preferences), config))
    }

    /// A store for an environment without storage: every read is `None`,
    /// every write reports failure.
    pub fn unavailable(config: StoreConfig) -> Self {
        Self::new(
            Arc::new(UnavailableScope::new("session")),
            Arc::new(UnavailableScope::new("preferences")),
            config,
        )
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Random id of this store instance, written next to the envelope for
    /// diagnostics.
    pub fn page_load_id(&self) -> &str {
        &self.page_load_id
    }

    pub fn session_scope(&self) -> &dyn StorageScope {
        self.session.as_ref()
    }

    pub fn preference_scope(&self) -> &dyn StorageScope {
        self.preferences.as_ref()
    }

    /// Drop every key this store owns and start a new page load.
    pub fn reset(&mut self) {
        self.clear_all();
        self.page_load_id = new_page_load_id();
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn now_iso(&self) -> String {
        crate::ttl::to_iso(self.now())
    }

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

fn new_page_load_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Read a key, treating backend errors as absence.
fn read_raw(scope: &dyn StorageScope, key: &str) -> Option<String> {
    match scope.get(key) {
        Ok(value) => value,
        Err(e) => {
            if !e.is_unavailable() {
                warn!(scope = scope.name(), key = key, error = %e, "read failed");
            }
            None
        }
    }
}

/// Read and decode a JSON value, treating malformed JSON as absence.
fn read_json<T: DeserializeOwned>(scope: &dyn StorageScope, key: &str) -> Option<T> {
    let raw = read_raw(scope, key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(scope = scope.name(), key = key, error = %e, "stored value is not valid JSON");
            None
        }
    }
}

/// Remove a key, logging instead of failing.
fn remove_quietly(scope: &dyn StorageScope, key: &str) {
    if let Err(e) = scope.remove(key) {
        if !e.is_unavailable() {
            warn!(scope = scope.name(), key = key, error = %e, "remove failed");
        }
    }
}

/// List keys under a prefix, treating backend errors as an empty scope.
fn list_keys(scope: &dyn StorageScope, prefix: &str) -> Vec<String> {
    match scope.keys_with_prefix(prefix) {
        Ok(keys) => keys,
        Err(e) => {
            if !e.is_unavailable() {
                warn!(scope = scope.name(), prefix = prefix, error = %e, "listing keys failed");
            }
            Vec::new()
        }
    }
}
