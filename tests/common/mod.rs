//! Common test utilities and fixtures.
//!
//! Shared birth records, a store wired to a manual clock, and a scope that
//! fails on demand.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex, PoisonError};

use chart_cache::keys::CanonicalKey;
use chart_cache::storage::ScopeUsage;
use chart_cache::ttl;
use chart_cache::{
    ManualClock, MemoryScope, SessionStore, StorageError, StorageScope, StoreConfig,
};
use serde_json::{Value, json};

// =============================================================================
// Birth Records
// =============================================================================

/// Fixed start time for every manual clock; whole milliseconds so stored
/// timestamps round-trip exactly.
pub const START: &str = "2026-10-18T09:00:00.000Z";

/// The reference record used throughout the suite.
pub fn mumbai() -> Value {
    json!({
        "name": "Test Person",
        "dateOfBirth": "1990-01-01",
        "timeOfBirth": "12:00",
        "latitude": 19.076,
        "longitude": 72.8777,
        "timezone": "Asia/Kolkata"
    })
}

/// Same identity as [`mumbai`], formatted the way a form might send it.
pub fn mumbai_from_form() -> Value {
    json!({
        "timezone": " Asia/Kolkata ",
        "longitude": "72.8777",
        "latitude": "19.0760",
        "timeOfBirth": "12:00",
        "dateOfBirth": "1990-01-01",
        "name": "  Test Person ",
        "placeOfBirth": "Mumbai, India"
    })
}

pub fn delhi() -> Value {
    json!({
        "name": "Second Person",
        "dateOfBirth": "1985-03-15",
        "timeOfBirth": "06:30",
        "latitude": 28.6139,
        "longitude": 77.209,
        "timezone": "Asia/Kolkata"
    })
}

// =============================================================================
// Stores
// =============================================================================

/// A store over in-memory scopes driven by a manual clock.
pub struct TestStore {
    pub store: SessionStore,
    pub clock: Arc<ManualClock>,
}

impl TestStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        let clock = manual_clock();
        let store = SessionStore::in_memory(config).with_clock(clock.clone());
        Self { store, clock }
    }

    /// Use explicit scopes instead of fresh in-memory ones.
    pub fn with_scopes(session: Arc<dyn StorageScope>, preferences: Arc<dyn StorageScope>) -> Self {
        let clock = manual_clock();
        let store = SessionStore::new(session, preferences, StoreConfig::default())
            .with_clock(clock.clone());
        Self { store, clock }
    }

    pub fn session(&self) -> &dyn StorageScope {
        self.store.session_scope()
    }

    pub fn preferences(&self) -> &dyn StorageScope {
        self.store.preference_scope()
    }
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(ttl::parse_iso(START).unwrap()))
}

// =============================================================================
// Failing Scope
// =============================================================================

/// How a [`FailingScope`] fails.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Quota,
    Backend,
}

/// A memory scope whose writes to one configured key fail.
pub struct FailingScope {
    inner: MemoryScope,
    fail_on: Mutex<Option<(String, Failure)>>,
}

impl FailingScope {
    pub fn new() -> Self {
        Self {
            inner: MemoryScope::with_quota("failing", None),
            fail_on: Mutex::new(None),
        }
    }

    /// Fail every subsequent write to `key`.
    pub fn fail_writes_to(&self, key: &str, failure: Failure) {
        *self.fail_on.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((key.to_string(), failure));
    }

    pub fn heal(&self) {
        *self.fail_on.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl StorageScope for FailingScope {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let fail_on = self.fail_on.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match fail_on {
            Some((target, Failure::Quota)) if target == key => Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                required: value.len(),
                quota: 0,
            }),
            Some((target, Failure::Backend)) if target == key => {
                Err(StorageError::Backend(format!("injected failure writing '{key}'")))
            }
            _ => self.inner.set(key, value),
        }
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys()
    }

    fn usage(&self) -> Result<ScopeUsage, StorageError> {
        self.inner.usage()
    }
}

// =============================================================================
// Assertions
// =============================================================================

pub fn assert_no_canonical_keys(scope: &dyn StorageScope) {
    for key in CanonicalKey::ALL {
        assert!(
            !scope.contains(key.as_str()).unwrap(),
            "canonical key '{key}' should have been removed"
        );
    }
}

pub fn assert_canonical_keys_present(scope: &dyn StorageScope, keys: &[CanonicalKey]) {
    for key in keys {
        assert!(
            scope.contains(key.as_str()).unwrap(),
            "canonical key '{key}' should be present"
        );
    }
}
