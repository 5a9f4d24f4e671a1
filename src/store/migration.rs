//! One-shot migration of birth records stored under legacy keys.

use serde_json::{Map, Value};

use super::session::{BIRTH_DATA_FIELD, CHART_ID_FIELD};
use super::{SessionStore, read_json, read_raw, remove_quietly};
use crate::keys::{LegacyKey, LegacyScope};
use crate::logging::{debug, info, warn};
use crate::record::BirthRecord;
use crate::storage::StorageScope;

/// Field holding the record inside a `{data, chartId}` wrapper.
const WRAPPED_DATA_FIELD: &str = "data";

impl SessionStore {
    /// Move the first legacy payload found into the canonical envelope.
    ///
    /// Every legacy source is removed before the payload is validated, so
    /// an invalid payload is dropped rather than retried on the next read.
    /// Returns `true` when a record was written.
    pub(super) fn migrate_legacy(&self) -> bool {
        let Some((source, payload)) = LegacyKey::ALL
            .into_iter()
            .find_map(|key| self.read_legacy(key).map(|payload| (key, payload)))
        else {
            return false;
        };
        debug!(source = source.as_str(), "legacy payload found");

        self.remove_legacy_keys();

        let (data, chart_id) = unwrap_legacy(payload);
        let record = match BirthRecord::from_value(&data) {
            Ok(record) => record,
            Err(e) => {
                warn!(source = source.as_str(), error = %e, "dropping invalid legacy record");
                return false;
            }
        };

        match self.store_record(&record, chart_id.as_deref()) {
            Ok(()) => {
                info!(source = source.as_str(), has_chart_id = chart_id.is_some(), "legacy record migrated");
                true
            }
            Err(e) => {
                warn!(source = source.as_str(), error = %e, "legacy migration failed");
                false
            }
        }
    }

    /// Delete every legacy source. The session record is stripped of its
    /// `birthData` field, never deleted.
    pub(super) fn remove_legacy_keys(&self) {
        for key in LegacyKey::ALL {
            if key.is_embedded() {
                self.strip_session_fields(&[BIRTH_DATA_FIELD]);
            } else {
                remove_quietly(self.legacy_scope(key), key.as_str());
            }
        }
    }

    /// Legacy keys currently present, for diagnostics.
    pub(super) fn legacy_keys_present(&self) -> Vec<LegacyKey> {
        LegacyKey::ALL
            .into_iter()
            .filter(|key| self.read_legacy(*key).is_some())
            .collect()
    }

    fn read_legacy(&self, key: LegacyKey) -> Option<Value> {
        if key.is_embedded() {
            let session: Map<String, Value> = read_json(self.session_scope(), key.as_str())?;
            let data = session.get(BIRTH_DATA_FIELD).filter(|v| !v.is_null())?;
            let mut wrapped = Map::new();
            wrapped.insert(WRAPPED_DATA_FIELD.to_string(), data.clone());
            if let Some(chart_id) = session.get(CHART_ID_FIELD) {
                wrapped.insert(CHART_ID_FIELD.to_string(), chart_id.clone());
            }
            return Some(Value::Object(wrapped));
        }

        let raw = read_raw(self.legacy_scope(key), key.as_str())?;
        // Undecodable payloads still count as found so that they get deleted
        Some(serde_json::from_str(&raw).unwrap_or(Value::Null))
    }

    fn legacy_scope(&self, key: LegacyKey) -> &dyn StorageScope {
        match key.scope() {
            LegacyScope::Session => self.session_scope(),
            LegacyScope::Preferences => self.preference_scope(),
        }
    }
}

/// Split a `{data, chartId}` wrapper into record and chart id. Bare records
/// pass through without a chart id.
fn unwrap_legacy(payload: Value) -> (Value, Option<String>) {
    match payload {
        Value::Object(mut fields) if fields.contains_key(WRAPPED_DATA_FIELD) => {
            let chart_id = fields
                .remove(CHART_ID_FIELD)
                .and_then(|id| match id {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|id| !id.is_empty());
            let data = fields.remove(WRAPPED_DATA_FIELD).unwrap_or(Value::Null);
            (data, chart_id)
        }
        other => (other, None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::StoreConfig;
    use crate::keys::{CanonicalKey, SESSION_KEY};

    fn legacy_record() -> Value {
        json!({
            "name": "Legacy",
            "dateOfBirth": "1972-11-05",
            "timeOfBirth": "23:10",
            "latitude": "12.9716",
            "longitude": "77.5946",
            "timezone": "Asia/Kolkata"
        })
    }

    #[test]
    fn test_unwrap_legacy() {
        let (data, chart_id) = unwrap_legacy(json!({ "data": { "a": 1 }, "chartId": 42 }));
        assert_eq!(data, json!({ "a": 1 }));
        assert_eq!(chart_id.as_deref(), Some("42"));

        let (data, chart_id) = unwrap_legacy(json!({ "a": 1 }));
        assert_eq!(data, json!({ "a": 1 }));
        assert_eq!(chart_id, None);

        let (_, chart_id) = unwrap_legacy(json!({ "data": {}, "chartId": "  " }));
        assert_eq!(chart_id, None);
    }

    #[test]
    fn test_wrapped_session_key_migrates_with_chart_id() {
        let store = SessionStore::in_memory(StoreConfig::default());
        let wrapped = json!({ "data": legacy_record(), "chartId": "legacy-chart" });
        store
            .session_scope()
            .set("birth_data_session", &wrapped.to_string())
            .unwrap();

        let envelope = store.get_birth_data().unwrap();
        assert_eq!(envelope.data.latitude, 12.9716);
        assert_eq!(store.get_chart_id().as_deref(), Some("legacy-chart"));
        assert!(!store.session_scope().contains("birth_data_session").unwrap());
    }

    #[test]
    fn test_source_order() {
        let store = SessionStore::in_memory(StoreConfig::default());
        let mut newer = legacy_record();
        newer["name"] = json!("Session Key");
        store
            .session_scope()
            .set("birth_data_session", &newer.to_string())
            .unwrap();
        store
            .preference_scope()
            .set("jyotish_shastra_data_birthData", &legacy_record().to_string())
            .unwrap();

        let envelope = store.get_birth_data().unwrap();
        assert_eq!(envelope.data.display_name(), "Session Key");
        // Losing sources are removed too
        assert!(
            !store
                .preference_scope()
                .contains("jyotish_shastra_data_birthData")
                .unwrap()
        );
    }

    #[test]
    fn test_session_field_is_stripped_not_deleted() {
        let store = SessionStore::in_memory(StoreConfig::default());
        let session = json!({ "birthData": legacy_record(), "apiResponse": { "chart": {} } });
        store
            .session_scope()
            .set(SESSION_KEY, &session.to_string())
            .unwrap();

        assert!(store.get_birth_data().is_some());
        let session = store.session_record().unwrap();
        assert!(session.contains_key("apiResponse"));
    }

    #[test]
    fn test_invalid_payload_dropped() {
        let store = SessionStore::in_memory(StoreConfig::default());
        store.session_scope().set("birthData", "{not json").unwrap();

        assert_eq!(store.get_birth_data(), None);
        assert!(!store.session_scope().contains("birthData").unwrap());
        assert!(
            !store
                .session_scope()
                .contains(CanonicalKey::BirthData.as_str())
                .unwrap()
        );
    }
}
