//! The canonical envelope: birth record, chart id and their metadata.

use serde_json::Value;

use super::session::{BIRTH_DATA_FIELD, CHART_ID_FIELD};
use super::{SessionStore, list_keys, read_raw, remove_quietly};
use crate::envelope::{Envelope, EnvelopeMeta, Lookup};
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::keys::{API_PREFIX, CanonicalKey, LAST_CHART_KEY, PREFERENCE_PREFIX, SESSION_KEY};
use crate::logging::{debug, error, info, warn};
use crate::record::BirthRecord;
use crate::storage::StorageError;
use crate::ttl::{self, Freshness};

/// Outcome of checking the stored `updatedAt`/`schema` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stamp {
    /// No `updatedAt` is stored.
    Missing,
    Fresh,
    /// The stamp failed a check and canonical state was cleared.
    Cleared,
}

impl SessionStore {
    /// Validate and store a birth record as the current envelope.
    ///
    /// Returns `Ok(false)` when the candidate is rejected (canonical state
    /// is cleared) or storage does not exist. A failed canonical write
    /// clears canonical state and returns [`Error::Write`].
    pub fn set_birth_data(&self, candidate: &Value) -> Result<bool> {
        if !self.session.is_available() {
            return Ok(false);
        }

        match BirthRecord::from_value(candidate) {
            Ok(record) => {
                self.store_record(&record, None)?;
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "rejected birth record, clearing canonical state");
                self.clear();
                Ok(false)
            }
        }
    }

    /// Typed variant of [`set_birth_data`](Self::set_birth_data).
    pub fn set_birth_record(&self, record: &BirthRecord) -> Result<bool> {
        self.set_birth_data(&record.to_value())
    }

    /// Read the current envelope without applying anything but the TTL,
    /// schema and decode checks.
    ///
    /// A miss triggers one legacy migration attempt followed by one re-read.
    pub fn lookup_birth_data(&self) -> Lookup {
        if !self.session.is_available() {
            return Lookup::Unavailable;
        }

        match self.read_envelope() {
            Lookup::Absent if self.migrate_legacy() => self.read_envelope(),
            other => other,
        }
    }

    /// The current envelope, if one is stored and fresh.
    pub fn get_birth_data(&self) -> Option<Envelope> {
        self.lookup_birth_data().found()
    }

    /// Metadata of the current envelope.
    pub fn get_meta(&self) -> Option<EnvelopeMeta> {
        self.get_birth_data().map(|envelope| envelope.meta)
    }

    /// Store the chart id computed for the current record.
    ///
    /// Refreshes `updatedAt`, so a chart id extends the TTL window of the
    /// record it belongs to. Empty ids are rejected with `Ok(false)`, as is
    /// a stored envelope that is already expired or under another schema;
    /// that envelope is cleared instead of refreshed.
    pub fn set_chart_id(&self, chart_id: impl ToString) -> Result<bool> {
        let chart_id = chart_id.to_string();
        let chart_id = chart_id.trim();
        if chart_id.is_empty() || !self.session.is_available() {
            return Ok(false);
        }
        if self.check_stamp() == Stamp::Cleared {
            return Ok(false);
        }

        self.write_canonical(CanonicalKey::ChartId, chart_id)?;
        self.write_canonical(CanonicalKey::UpdatedAt, &self.now_iso())?;
        self.write_canonical(CanonicalKey::Schema, &self.config.schema_version)?;
        debug!(chart_id = chart_id, "chart id stored");

        let mirrored = self.update_session_record(|record| {
            record.insert(CHART_ID_FIELD.to_string(), Value::String(chart_id.to_string()));
        });
        if let Err(e) = mirrored {
            warn!(error = %e, "failed to mirror chart id into session record");
        }
        Ok(true)
    }

    /// The chart id, gated by the same schema and TTL checks as the record.
    pub fn get_chart_id(&self) -> Option<String> {
        let scope = self.session_scope();
        if !scope.is_available() {
            return None;
        }
        if read_raw(scope, CanonicalKey::UpdatedAt.as_str()).is_none() {
            self.migrate_legacy();
        }

        match self.check_stamp() {
            Stamp::Fresh => read_raw(scope, CanonicalKey::ChartId.as_str())
                .filter(|id| !id.trim().is_empty()),
            Stamp::Missing | Stamp::Cleared => None,
        }
    }

    /// Apply the schema and TTL checks to the stored `updatedAt`/`schema`
    /// pair, clearing canonical state when they fail.
    fn check_stamp(&self) -> Stamp {
        let scope = self.session_scope();
        let Some(saved_at_iso) = read_raw(scope, CanonicalKey::UpdatedAt.as_str()) else {
            return Stamp::Missing;
        };

        let schema = read_raw(scope, CanonicalKey::Schema.as_str());
        if schema.as_deref() != Some(self.config.schema_version.as_str()) {
            warn!(stored = ?schema, "canonical state stored under another schema, clearing");
            self.clear();
            return Stamp::Cleared;
        }
        let Some(saved_at) = ttl::parse_iso(&saved_at_iso) else {
            warn!(value = %saved_at_iso, "unreadable updatedAt, clearing");
            self.clear();
            return Stamp::Cleared;
        };
        if let Freshness::Expired { age } =
            Freshness::evaluate(saved_at, self.now(), self.config.ttl())
        {
            info!(age_secs = age.as_secs(), "canonical state expired, clearing");
            self.clear();
            return Stamp::Cleared;
        }
        Stamp::Fresh
    }

    /// Remove canonical and legacy keys and strip `birthData`/`chartId`
    /// from the session record. Every other session field is kept.
    pub fn clear(&self) {
        self.clear_canonical_keys();
        self.remove_legacy_keys();
        self.strip_session_fields(&[BIRTH_DATA_FIELD, CHART_ID_FIELD]);
        debug!("canonical state cleared");
    }

    /// [`clear`](Self::clear), then drop the session record, the last chart,
    /// every timestamped API payload and every preference entry.
    pub fn clear_all(&self) {
        self.clear();

        let session = self.session_scope();
        remove_quietly(session, SESSION_KEY);
        remove_quietly(session, LAST_CHART_KEY);
        for key in list_keys(session, API_PREFIX) {
            remove_quietly(session, &key);
        }

        let preferences = self.preference_scope();
        for key in list_keys(preferences, PREFERENCE_PREFIX) {
            remove_quietly(preferences, &key);
        }
        info!("all stored data cleared");
    }

    /// Write a validated record as a fresh envelope.
    ///
    /// A changed fingerprint, or a chart id stored with no record at all,
    /// drops the stored chart id first; `chart_id`, when given, is written
    /// with the envelope.
    pub(super) fn store_record(&self, record: &BirthRecord, chart_id: Option<&str>) -> Result<()> {
        let fingerprint = Fingerprint::of(record);

        let previous = read_raw(self.session_scope(), CanonicalKey::Fingerprint.as_str());
        let foreign_chart_id = match previous.as_deref() {
            Some(previous) => previous != fingerprint.as_str(),
            None => chart_id.is_none(),
        };
        if foreign_chart_id {
            debug!(previous = ?previous, current = %fingerprint, "dropping chart id of another record");
            if let Err(source) = self.session.remove(CanonicalKey::ChartId.as_str()) {
                return Err(self.fail_write(CanonicalKey::ChartId, source));
            }
            self.strip_session_fields(&[CHART_ID_FIELD]);
        }

        let data = match serde_json::to_string(record) {
            Ok(data) => data,
            Err(e) => {
                self.clear();
                return Err(e.into());
            }
        };

        let saved_at = self.now_iso();
        self.write_canonical(CanonicalKey::BirthData, &data)?;
        self.write_canonical(CanonicalKey::UpdatedAt, &saved_at)?;
        self.write_canonical(CanonicalKey::Fingerprint, fingerprint.as_str())?;
        self.write_canonical(CanonicalKey::Schema, &self.config.schema_version)?;
        self.write_canonical(CanonicalKey::PageLoadId, &self.page_load_id)?;
        if let Some(chart_id) = chart_id {
            self.write_canonical(CanonicalKey::ChartId, chart_id)?;
        }
        info!(fingerprint = %fingerprint, saved_at = %saved_at, "birth record stored");

        let mirrored = self.update_session_record(|session| {
            session.insert(BIRTH_DATA_FIELD.to_string(), record.to_value());
            if let Some(chart_id) = chart_id {
                session.insert(CHART_ID_FIELD.to_string(), Value::String(chart_id.to_string()));
            }
        });
        if let Err(e) = mirrored {
            warn!(error = %e, "failed to mirror birth record into session record");
        }
        Ok(())
    }

    /// Read the envelope as stored, without migrating.
    fn read_envelope(&self) -> Lookup {
        let scope = self.session_scope();

        let Some(raw_data) = read_raw(scope, CanonicalKey::BirthData.as_str()) else {
            return Lookup::Absent;
        };
        let Some(saved_at_iso) = read_raw(scope, CanonicalKey::UpdatedAt.as_str()) else {
            return self.corrupt(CanonicalKey::UpdatedAt, "missing".to_string());
        };
        let Some(fingerprint) = read_raw(scope, CanonicalKey::Fingerprint.as_str()) else {
            return self.corrupt(CanonicalKey::Fingerprint, "missing".to_string());
        };
        let Some(schema) = read_raw(scope, CanonicalKey::Schema.as_str()) else {
            return self.corrupt(CanonicalKey::Schema, "missing".to_string());
        };

        if schema != self.config.schema_version {
            warn!(stored = %schema, expected = %self.config.schema_version, "schema mismatch, clearing");
            self.clear();
            return Lookup::SchemaMismatch { stored: schema };
        }

        let Some(saved_at) = ttl::parse_iso(&saved_at_iso) else {
            return self.corrupt(
                CanonicalKey::UpdatedAt,
                format!("'{saved_at_iso}' is not an RFC 3339 timestamp"),
            );
        };
        if let Freshness::Expired { age } =
            Freshness::evaluate(saved_at, self.now(), self.config.ttl())
        {
            info!(age_secs = age.as_secs(), "envelope expired, clearing");
            self.clear();
            return Lookup::Expired { age };
        }

        let value: Value = match serde_json::from_str(&raw_data) {
            Ok(value) => value,
            Err(e) => return self.corrupt(CanonicalKey::BirthData, e.to_string()),
        };
        let data = match BirthRecord::from_value(&value) {
            Ok(record) => record,
            Err(e) => return self.corrupt(CanonicalKey::BirthData, e.to_string()),
        };

        Lookup::Found(Envelope {
            data,
            meta: EnvelopeMeta {
                saved_at_iso,
                fingerprint: Fingerprint::from_stored(fingerprint),
                schema_version: schema,
            },
        })
    }

    fn corrupt(&self, key: CanonicalKey, reason: String) -> Lookup {
        warn!(key = %key, reason = %reason, "corrupt canonical value, clearing");
        self.clear();
        Lookup::Corrupt { key, reason }
    }

    fn write_canonical(&self, key: CanonicalKey, value: &str) -> Result<()> {
        self.session
            .set(key.as_str(), value)
            .map_err(|source| self.fail_write(key, source))
    }

    fn fail_write(&self, key: CanonicalKey, source: StorageError) -> Error {
        error!(key = %key, error = %source, "canonical write failed, clearing canonical state");
        self.clear();
        Error::Write { key, source }
    }

    pub(super) fn clear_canonical_keys(&self) {
        for key in CanonicalKey::ALL {
            remove_quietly(self.session_scope(), key.as_str());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::config::StoreConfig;
    use crate::ttl::ManualClock;

    fn mumbai() -> Value {
        json!({
            "name": "Test Person",
            "dateOfBirth": "1990-01-01",
            "timeOfBirth": "12:00",
            "latitude": 19.076,
            "longitude": 72.8777,
            "timezone": "Asia/Kolkata"
        })
    }

    fn store_with_clock() -> (SessionStore, Arc<ManualClock>) {
        let start = ttl::parse_iso("2026-10-18T09:00:00.000Z").unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = SessionStore::in_memory(StoreConfig::default()).with_clock(clock.clone());
        (store, clock)
    }

    #[test]
    fn test_set_and_get() {
        let (store, _) = store_with_clock();
        assert!(store.set_birth_data(&mumbai()).unwrap());

        let envelope = store.get_birth_data().unwrap();
        assert_eq!(envelope.data.display_name(), "Test Person");
        assert_eq!(envelope.meta.schema_version, "2");
        assert_eq!(envelope.meta.fingerprint, Fingerprint::of(&envelope.data));
        assert_eq!(
            read_raw(store.session_scope(), CanonicalKey::PageLoadId.as_str()).as_deref(),
            Some(store.page_load_id())
        );
    }

    #[test]
    fn test_rejected_record_clears() {
        let (store, _) = store_with_clock();
        store.set_birth_data(&mumbai()).unwrap();
        store.set_chart_id("chart_1").unwrap();

        assert!(!store.set_birth_data(&json!({})).unwrap());
        for key in CanonicalKey::ALL {
            assert!(!store.session_scope().contains(key.as_str()).unwrap());
        }
        assert_eq!(store.get_birth_data(), None);
        assert_eq!(store.get_chart_id(), None);
    }

    #[test]
    fn test_expiry_boundary() {
        let (store, clock) = store_with_clock();
        store.set_birth_data(&mumbai()).unwrap();

        clock.advance(store.config().ttl());
        assert!(store.get_birth_data().is_some());

        // The read above does not refresh updatedAt
        clock.advance(Duration::from_millis(1));
        assert!(matches!(store.lookup_birth_data(), Lookup::Expired { .. }));
        assert!(!store.session_scope().contains(CanonicalKey::BirthData.as_str()).unwrap());
        assert_eq!(store.lookup_birth_data(), Lookup::Absent);
    }

    #[test]
    fn test_chart_id_refreshes_window() {
        let (store, clock) = store_with_clock();
        store.set_birth_data(&mumbai()).unwrap();

        clock.advance(Duration::from_secs(600));
        assert!(store.set_chart_id(12345).unwrap());
        clock.advance(Duration::from_secs(600));

        assert_eq!(store.get_chart_id().as_deref(), Some("12345"));
        assert!(store.get_birth_data().is_some());
    }

    #[test]
    fn test_chart_id_dropped_on_new_fingerprint() {
        let (store, _) = store_with_clock();
        store.set_birth_data(&mumbai()).unwrap();
        store.set_chart_id("chart_1").unwrap();

        // Same identity keeps the chart id
        store.set_birth_data(&mumbai()).unwrap();
        assert_eq!(store.get_chart_id().as_deref(), Some("chart_1"));

        let mut changed = mumbai();
        changed["timeOfBirth"] = json!("18:45");
        store.set_birth_data(&changed).unwrap();
        assert_eq!(store.get_chart_id(), None);
        let session = store.session_record().unwrap();
        assert!(!session.contains_key(CHART_ID_FIELD));
    }

    #[test]
    fn test_empty_chart_id_rejected() {
        let (store, _) = store_with_clock();
        assert!(!store.set_chart_id("   ").unwrap());
        assert_eq!(store.get_chart_id(), None);
    }

    #[test]
    fn test_chart_id_does_not_revive_expired_record() {
        let (store, clock) = store_with_clock();
        store.set_birth_data(&mumbai()).unwrap();

        clock.advance(store.config().ttl() + Duration::from_millis(1));
        assert!(!store.set_chart_id("late_chart").unwrap());

        assert_eq!(store.get_birth_data(), None);
        assert_eq!(store.get_chart_id(), None);
        for key in CanonicalKey::ALL {
            assert!(!store.session_scope().contains(key.as_str()).unwrap());
        }
    }

    #[test]
    fn test_chart_id_rejected_under_other_schema() {
        let (store, _) = store_with_clock();
        store.set_birth_data(&mumbai()).unwrap();
        store
            .session_scope()
            .set(CanonicalKey::Schema.as_str(), "1")
            .unwrap();

        assert!(!store.set_chart_id("chart_1").unwrap());
        assert_eq!(store.get_birth_data(), None);
    }

    #[test]
    fn test_orphan_chart_id_not_attached_to_new_record() {
        let (store, _) = store_with_clock();
        assert!(store.set_chart_id("chart_for_unknown").unwrap());

        store.set_birth_data(&mumbai()).unwrap();

        assert_eq!(store.get_chart_id(), None);
        assert!(!store.session_scope().contains(CanonicalKey::ChartId.as_str()).unwrap());
        let session = store.session_record().unwrap();
        assert!(!session.contains_key(CHART_ID_FIELD));
    }

    #[test]
    fn test_schema_mismatch_clears() {
        let (store, _) = store_with_clock();
        store.set_birth_data(&mumbai()).unwrap();
        store
            .session_scope()
            .set(CanonicalKey::Schema.as_str(), "1")
            .unwrap();

        assert_eq!(
            store.lookup_birth_data(),
            Lookup::SchemaMismatch {
                stored: "1".to_string()
            }
        );
        assert_eq!(store.get_birth_data(), None);
    }

    #[test]
    fn test_corrupt_record_clears() {
        let (store, _) = store_with_clock();
        store.set_birth_data(&mumbai()).unwrap();
        store
            .session_scope()
            .set(CanonicalKey::BirthData.as_str(), "{not json")
            .unwrap();

        assert!(matches!(
            store.lookup_birth_data(),
            Lookup::Corrupt {
                key: CanonicalKey::BirthData,
                ..
            }
        ));
        assert!(!store.session_scope().contains(CanonicalKey::Fingerprint.as_str()).unwrap());
    }

    #[test]
    fn test_clear_keeps_other_session_fields() {
        let (store, _) = store_with_clock();
        store.set_birth_data(&mumbai()).unwrap();
        store
            .save_api_response(&json!({ "chart": { "ascendant": "Aries" } }))
            .unwrap();

        store.clear();
        let session = store.session_record().unwrap();
        assert!(!session.contains_key(BIRTH_DATA_FIELD));
        assert!(session.contains_key("apiResponse"));
        assert_eq!(store.get_birth_data(), None);
    }

    #[test]
    fn test_clear_all() {
        let (store, _) = store_with_clock();
        store.set_birth_data(&mumbai()).unwrap();
        store.set_preference("theme", json!("dark")).unwrap();
        store
            .save_api_response(&json!({ "chart": { "ascendant": "Aries" } }))
            .unwrap();

        store.clear_all();
        assert!(store.session_scope().keys().unwrap().is_empty());
        assert!(store.preference_scope().keys().unwrap().is_empty());
    }
}
