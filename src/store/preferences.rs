//! Long-lived preference entries.

use std::time::Duration;

use serde_json::Value;

use super::session::SaveFailure;
use super::{SessionStore, list_keys, read_raw, remove_quietly};
use crate::keys::{PREFERENCE_PREFIX, preference_key};
use crate::logging::{debug, info};
use crate::ttl;

impl SessionStore {
    /// Store a preference under `jyotish_shastra_data_<name>`.
    pub fn set_preference(&self, name: &str, value: Value) -> Result<(), SaveFailure> {
        if !self.preferences.is_available() {
            return Err(SaveFailure::Unavailable);
        }
        let raw = serde_json::to_string(&value)?;
        self.preferences
            .set(&preference_key(name), &raw)
            .map_err(|e| self.save_failure(e))?;
        debug!(name = name, "preference stored");
        Ok(())
    }

    pub fn get_preference(&self, name: &str) -> Option<Value> {
        super::read_json(self.preference_scope(), &preference_key(name))
    }

    pub fn remove_preference(&self, name: &str) {
        remove_quietly(self.preference_scope(), &preference_key(name));
    }

    /// Sweep the preference scope.
    ///
    /// Removes entries whose `timestamp` field is older than the configured
    /// maximum age, and entries that are not valid JSON. Entries without a
    /// timestamp are kept. Returns the number of keys removed.
    pub fn clear_expired_data(&self) -> usize {
        let scope = self.preference_scope();
        let removed = self
            .expired_preference_keys()
            .iter()
            .filter(|key| scope.remove(key).is_ok())
            .count();

        if removed > 0 {
            info!(removed = removed, "expired preference entries swept");
        }
        removed
    }

    /// Preference keys [`clear_expired_data`](Self::clear_expired_data)
    /// would remove.
    pub(super) fn expired_preference_keys(&self) -> Vec<String> {
        let scope = self.preference_scope();
        let now = self.now();
        let max_age = self.config.preference_max_age();

        list_keys(scope, PREFERENCE_PREFIX)
            .into_iter()
            .filter(|key| {
                read_raw(scope, key).is_some_and(|raw| {
                    match serde_json::from_str::<Value>(&raw) {
                        Ok(value) => is_older_than(&value, now, max_age),
                        Err(_) => true,
                    }
                })
            })
            .collect()
    }
}

/// Whether a preference entry carries a `timestamp` older than `max_age`.
///
/// RFC 3339 strings and epoch milliseconds are both accepted; anything
/// else counts as "no timestamp".
fn is_older_than(value: &Value, now: chrono::DateTime<chrono::Utc>, max_age: Duration) -> bool {
    let saved_at = match value.get("timestamp") {
        Some(Value::String(s)) => ttl::parse_iso(s),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis),
        _ => None,
    };
    saved_at.is_some_and(|saved_at| {
        (now - saved_at)
            .to_std()
            .is_ok_and(|age| age > max_age)
    })
}
