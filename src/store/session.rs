//! Best-effort session data: the session record, API payloads, analyses
//! and the last generated chart.
//!
//! Nothing here touches canonical keys except through
//! [`SessionStore::store_record`]. Failures come back as [`SaveFailure`]
//! values and never clear canonical state.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use super::{SessionStore, list_keys, read_json, read_raw, remove_quietly};
use crate::envelope::Envelope;
use crate::error::Error;
use crate::fingerprint::Fingerprint;
use crate::keys::{
    API_CHART_PREFIX, API_COMPREHENSIVE_PREFIX, API_PREFIX, LAST_CHART_KEY, SESSION_KEY,
    api_analysis_key, api_analysis_prefix, api_chart_key, api_comprehensive_key,
    latest_timestamped,
};
use crate::logging::{debug, info, warn};
use crate::record::BirthRecord;
use crate::storage::{StorageError, StorageScope};

pub(super) const BIRTH_DATA_FIELD: &str = "birthData";
pub(super) const CHART_ID_FIELD: &str = "chartId";
const API_RESPONSE_FIELD: &str = "apiResponse";
const COMPREHENSIVE_FIELD: &str = "comprehensiveAnalysis";
const ANALYSIS_DATA_FIELD: &str = "analysisData";
const SESSION_ID_FIELD: &str = "sessionId";
const TIMESTAMP_FIELD: &str = "timestamp";
const UPDATED_AT_FIELD: &str = "updatedAt";
const PREFERENCES_FIELD: &str = "preferences";

/// Why a best-effort save did not happen.
#[derive(Error, Debug)]
pub enum SaveFailure {
    #[error("storage is not available")]
    Unavailable,

    /// The scope ran out of space. Expired preference entries were swept
    /// before returning; the save itself is not retried.
    #[error("storage quota exceeded ({swept} expired entries cleared)")]
    QuotaExceeded { swept: usize },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SaveFailure {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Result of a successful [`SessionStore::save_session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSaved {
    pub session_id: String,
    pub saved_at: String,
}

/// Everything [`SessionStore::load_session`] could find.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedSession {
    pub current_session: Option<Map<String, Value>>,
    pub preferences: Option<Value>,
    /// The canonical envelope, subject to the usual TTL checks.
    pub birth_data: Option<Envelope>,
    pub loaded_at: String,
}

/// Where a timestamped analysis payload was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAnalysis {
    pub key: String,
    pub saved_at: String,
}

/// Analysis sections the UI requests one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Houses,
    Dasha,
    Navamsa,
    Aspects,
    Arudha,
    Lagna,
    Preliminary,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 7] = [
        AnalysisKind::Houses,
        AnalysisKind::Dasha,
        AnalysisKind::Navamsa,
        AnalysisKind::Aspects,
        AnalysisKind::Arudha,
        AnalysisKind::Lagna,
        AnalysisKind::Preliminary,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Houses => "houses",
            Self::Dasha => "dasha",
            Self::Navamsa => "navamsa",
            Self::Aspects => "aspects",
            Self::Arudha => "arudha",
            Self::Lagna => "lagna",
            Self::Preliminary => "preliminary",
        }
    }
}

impl AsRef<str> for AnalysisKind {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The most recently generated chart and the record it was generated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastChart {
    pub chart_id: String,
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
    pub saved_at: String,
}

impl SessionStore {
    /// The loosely-typed session record, if one exists and decodes.
    pub fn session_record(&self) -> Option<Map<String, Value>> {
        read_json(self.session_scope(), SESSION_KEY)
    }

    /// Merge `data` into the session record under a fresh session id.
    ///
    /// A `birthData` field goes through validation and the canonical path
    /// instead of being copied verbatim. A `preferences` field is also
    /// written to the preference scope.
    pub fn save_session(&self, mut data: Map<String, Value>) -> Result<SessionSaved, SaveFailure> {
        if !self.session.is_available() {
            return Err(SaveFailure::Unavailable);
        }

        if let Some(candidate) = data.remove(BIRTH_DATA_FIELD).filter(|v| !v.is_null()) {
            let record = BirthRecord::from_value(&candidate)
                .map_err(|e| SaveFailure::InvalidPayload(e.to_string()))?;
            self.store_record(&record, None)
                .map_err(|e| self.canonical_failure(e))?;
        }

        if let Some(preferences) = data.get(PREFERENCES_FIELD).filter(|v| !v.is_null()) {
            self.set_preference(PREFERENCES_FIELD, preferences.clone())?;
        }

        let session_id = self.new_session_id();
        let saved_at = self.now_iso();
        self.update_session_record(|record| {
            record.extend(data);
            record.insert(SESSION_ID_FIELD.to_string(), Value::String(session_id.clone()));
            record.insert(TIMESTAMP_FIELD.to_string(), Value::String(saved_at.clone()));
        })
        .map_err(|e| self.save_failure(e))?;

        debug!(session_id = %session_id, "session saved");
        Ok(SessionSaved {
            session_id,
            saved_at,
        })
    }

    pub fn load_session(&self) -> LoadedSession {
        LoadedSession {
            current_session: self.session_record(),
            preferences: self.get_preference(PREFERENCES_FIELD),
            birth_data: self.get_birth_data(),
            loaded_at: self.now_iso(),
        }
    }

    /// Store a chart/analysis API response as the session's `apiResponse`.
    ///
    /// A response carrying a chart replaces every older timestamped chart
    /// payload.
    pub fn save_api_response(&self, response: &Value) -> Result<(), SaveFailure> {
        if !self.session.is_available() {
            return Err(SaveFailure::Unavailable);
        }
        let Value::Object(fields) = response else {
            return Err(SaveFailure::InvalidPayload(
                "API response must be a JSON object".to_string(),
            ));
        };

        let chart = first_present(fields, &["chart", "rasiChart"]);
        let navamsa = first_present(fields, &["navamsa", "navamsaChart"]);
        let analysis = first_present(fields, &["analysis"]);
        let sections = analysis
            .as_ref()
            .and_then(|a| a.get("sections"))
            .filter(|s| !s.is_null())
            .cloned();
        let success = fields.get("success").and_then(Value::as_bool).unwrap_or(true);
        let timestamp = self.now_iso();

        if let Some(chart) = &chart {
            for key in list_keys(self.session_scope(), API_CHART_PREFIX) {
                remove_quietly(self.session_scope(), &key);
            }
            let payload = json!({ "success": success, "chart": chart, "timestamp": timestamp });
            self.write_payload(&api_chart_key(self.now_millis()), &payload)?;
        }

        let normalized = json!({
            "chart": chart,
            "navamsa": navamsa,
            "analysis": analysis,
            "sections": sections,
            "metadata": first_present(fields, &["metadata"]),
            "success": success,
            "timestamp": timestamp,
        });
        self.update_session_record(|record| {
            record.insert(API_RESPONSE_FIELD.to_string(), normalized);
        })
        .map_err(|e| self.save_failure(e))?;

        debug!(has_chart = chart.is_some(), "API response saved");
        Ok(())
    }

    /// Store a comprehensive analysis document, replacing older ones.
    pub fn save_comprehensive_analysis(&self, analysis: &Value) -> Result<SavedAnalysis, SaveFailure> {
        if !self.session.is_available() {
            return Err(SaveFailure::Unavailable);
        }
        if !analysis.is_object() {
            return Err(SaveFailure::InvalidPayload(
                "analysis must be a JSON object".to_string(),
            ));
        }

        for key in list_keys(self.session_scope(), API_COMPREHENSIVE_PREFIX) {
            remove_quietly(self.session_scope(), &key);
        }

        let millis = self.now_millis();
        let saved_at = self.now_iso();
        let metadata = analysis.get("metadata");
        let meta_field = |name: &str| metadata.and_then(|m| m.get(name)).filter(|v| !v.is_null());

        let document = json!({
            "success": analysis.get("success").and_then(Value::as_bool).unwrap_or(true),
            "analysis": {
                "sections": analysis
                    .pointer("/analysis/sections")
                    .or_else(|| analysis.get("sections"))
                    .cloned(),
            },
            "synthesis": analysis.get("synthesis").cloned(),
            "recommendations": analysis.get("recommendations").cloned(),
            "verification": analysis.get("verification").cloned(),
            "metadata": {
                "timestamp": saved_at,
                "analysisId": meta_field("analysisId")
                    .cloned()
                    .unwrap_or_else(|| Value::String(format!("analysis_{millis}"))),
                "completionPercentage": meta_field("completionPercentage").cloned().unwrap_or(json!(100)),
                "dataSource": meta_field("dataSource").cloned().unwrap_or(json!("chart-cache")),
                "status": meta_field("status").cloned().unwrap_or(json!("completed")),
            },
        });

        let key = api_comprehensive_key(millis);
        self.write_payload(&key, &document)?;
        self.update_session_record(|record| {
            record.insert(COMPREHENSIVE_FIELD.to_string(), document);
        })
        .map_err(|e| self.save_failure(e))?;

        info!(key = %key, "comprehensive analysis saved");
        Ok(SavedAnalysis { key, saved_at })
    }

    /// The comprehensive analysis: session record first, then an API
    /// response carrying an analysis, then the newest timestamped payload.
    pub fn get_comprehensive_analysis(&self) -> Option<Value> {
        let session = self.session_record();
        if let Some(session) = &session {
            if let Some(document) = present(session.get(COMPREHENSIVE_FIELD)) {
                return Some(document.clone());
            }
            if let Some(response) = present(session.get(API_RESPONSE_FIELD))
                && present(response.get("analysis")).is_some()
            {
                return Some(response.clone());
            }
        }
        self.latest_payload(API_COMPREHENSIVE_PREFIX)
    }

    /// Store one analysis section under a timestamped key and in the
    /// session record's `analysisData`.
    pub fn save_individual_analysis(
        &self,
        kind: impl AsRef<str>,
        payload: &Value,
    ) -> Result<SavedAnalysis, SaveFailure> {
        let kind = kind.as_ref().trim();
        if !self.session.is_available() {
            return Err(SaveFailure::Unavailable);
        }
        if kind.is_empty() {
            return Err(SaveFailure::InvalidPayload(
                "analysis type must not be empty".to_string(),
            ));
        }

        let saved_at = self.now_iso();
        let document = json!({
            "success": payload.get("success").and_then(Value::as_bool).unwrap_or(true),
            "analysis": present(payload.get("analysis")).unwrap_or(payload),
            "timestamp": saved_at,
            "analysisType": kind,
            "metadata": payload.get("metadata").cloned(),
        });

        let key = api_analysis_key(kind, self.now_millis());
        self.write_payload(&key, &document)?;
        self.update_session_record(|record| {
            let analyses = record
                .entry(ANALYSIS_DATA_FIELD)
                .or_insert_with(|| Value::Object(Map::new()));
            if !analyses.is_object() {
                *analyses = Value::Object(Map::new());
            }
            if let Value::Object(analyses) = analyses {
                analyses.insert(kind.to_string(), document);
            }
        })
        .map_err(|e| self.save_failure(e))?;

        debug!(key = %key, "analysis saved");
        Ok(SavedAnalysis { key, saved_at })
    }

    /// One analysis section: session record first, then the newest
    /// timestamped payload of that type.
    pub fn get_individual_analysis(&self, kind: impl AsRef<str>) -> Option<Value> {
        let kind = kind.as_ref().trim();
        let from_session = self.session_record().and_then(|session| {
            present(session.get(ANALYSIS_DATA_FIELD))
                .and_then(|analyses| present(analyses.get(kind)))
                .cloned()
        });
        from_session.or_else(|| self.latest_payload(&api_analysis_prefix(kind)))
    }

    pub fn get_houses_analysis(&self) -> Option<Value> {
        self.get_individual_analysis(AnalysisKind::Houses)
    }

    pub fn get_dasha_analysis(&self) -> Option<Value> {
        self.get_individual_analysis(AnalysisKind::Dasha)
    }

    pub fn get_navamsa_analysis(&self) -> Option<Value> {
        self.get_individual_analysis(AnalysisKind::Navamsa)
    }

    pub fn get_aspects_analysis(&self) -> Option<Value> {
        self.get_individual_analysis(AnalysisKind::Aspects)
    }

    pub fn get_arudha_analysis(&self) -> Option<Value> {
        self.get_individual_analysis(AnalysisKind::Arudha)
    }

    pub fn get_lagna_analysis(&self) -> Option<Value> {
        self.get_individual_analysis(AnalysisKind::Lagna)
    }

    pub fn get_preliminary_analysis(&self) -> Option<Value> {
        self.get_individual_analysis(AnalysisKind::Preliminary)
    }

    /// The chart of the current API response, else the newest chart payload.
    pub fn get_chart_data(&self) -> Option<Value> {
        let from_session = self.session_record().and_then(|session| {
            present(session.get(API_RESPONSE_FIELD))
                .and_then(|response| present(response.get("chart")))
                .cloned()
        });
        from_session.or_else(|| {
            self.latest_payload(API_CHART_PREFIX)
                .and_then(|payload| present(payload.get("chart")).cloned())
        })
    }

    /// Analysis of the current API response. Sections, when present, are
    /// returned as `{sections, success: true}`.
    pub fn get_analysis_data(&self) -> Option<Value> {
        let session = self.session_record()?;
        let response = present(session.get(API_RESPONSE_FIELD))?;
        if let Some(sections) = present(response.get("sections")) {
            return Some(json!({ "sections": sections, "success": true }));
        }
        present(response.get("analysis")).cloned()
    }

    /// Whether a fresh birth record and a chart are both available.
    pub fn has_complete_session(&self) -> bool {
        self.get_birth_data().is_some() && self.get_chart_data().is_some()
    }

    /// Drop every timestamped API payload. The session record and
    /// canonical state are kept.
    pub fn clear_api_responses(&self) -> usize {
        let keys = list_keys(self.session_scope(), API_PREFIX);
        for key in &keys {
            remove_quietly(self.session_scope(), key);
        }
        keys.len()
    }

    /// Remember the chart just generated.
    ///
    /// The fingerprint comes from `record` when given, else from the
    /// current envelope. Returns `false` for an empty id, an invalid
    /// record, or a failed write.
    pub fn set_last_chart(&self, chart_id: &str, record: Option<&Value>) -> bool {
        let chart_id = chart_id.trim();
        if chart_id.is_empty() || !self.session.is_available() {
            return false;
        }

        let fingerprint = match record {
            Some(candidate) => match BirthRecord::from_value(candidate) {
                Ok(record) => Some(Fingerprint::of(&record)),
                Err(e) => {
                    warn!(error = %e, "rejected record for last chart");
                    return false;
                }
            },
            None => self.get_meta().map(|meta| meta.fingerprint),
        };

        let last = LastChart {
            chart_id: chart_id.to_string(),
            fingerprint,
            saved_at: self.now_iso(),
        };
        match serde_json::to_string(&last) {
            Ok(raw) => match self.session.set(LAST_CHART_KEY, &raw) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "failed to store last chart");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "failed to serialize last chart");
                false
            }
        }
    }

    pub fn get_last_chart(&self) -> Option<LastChart> {
        read_json(self.session_scope(), LAST_CHART_KEY)
    }

    /// Whether the last chart was generated for the current record.
    pub fn is_last_chart_current(&self) -> bool {
        let Some(last) = self.get_last_chart() else {
            return false;
        };
        match (last.fingerprint, self.get_meta()) {
            (Some(stored), Some(meta)) => stored == meta.fingerprint,
            _ => false,
        }
    }

    /// Read-modify-write of the session record, stamping `updatedAt`.
    pub(super) fn update_session_record<F>(&self, update: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let mut record = self.session_record().unwrap_or_default();
        update(&mut record);
        record.insert(UPDATED_AT_FIELD.to_string(), Value::String(self.now_iso()));
        self.write_session_record(&record)
    }

    /// Remove fields from the session record if it exists. Failures are
    /// logged.
    pub(super) fn strip_session_fields(&self, fields: &[&str]) {
        let Some(mut record) = self.session_record() else {
            return;
        };
        let mut changed = false;
        for field in fields {
            changed |= record.remove(*field).is_some();
        }
        if changed && let Err(e) = self.write_session_record(&record) {
            warn!(error = %e, "failed to strip session record fields");
        }
    }

    fn write_session_record(&self, record: &Map<String, Value>) -> Result<(), StorageError> {
        let raw = serde_json::to_string(record).map_err(|e| StorageError::Serialization {
            key: SESSION_KEY.to_string(),
            reason: e.to_string(),
        })?;
        self.session.set(SESSION_KEY, &raw)
    }

    fn write_payload(&self, key: &str, payload: &Value) -> Result<(), SaveFailure> {
        let raw = serde_json::to_string(payload)?;
        self.session
            .set(key, &raw)
            .map_err(|e| self.save_failure(e))
    }

    fn latest_payload(&self, prefix: &str) -> Option<Value> {
        let scope: &dyn StorageScope = self.session_scope();
        let keys = list_keys(scope, prefix);
        let latest = latest_timestamped(&keys)?;
        read_raw(scope, latest).and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Map a scope error to a [`SaveFailure`], sweeping expired preference
    /// entries on quota exhaustion.
    pub(super) fn save_failure(&self, error: StorageError) -> SaveFailure {
        if error.is_unavailable() {
            return SaveFailure::Unavailable;
        }
        if error.is_quota_exceeded() {
            let swept = self.clear_expired_data();
            warn!(error = %error, swept = swept, "storage quota exceeded");
            return SaveFailure::QuotaExceeded { swept };
        }
        warn!(error = %error, "session save failed");
        SaveFailure::Storage(error)
    }

    fn canonical_failure(&self, error: Error) -> SaveFailure {
        match error {
            Error::Write { source, .. } | Error::Storage(source) => self.save_failure(source),
            Error::Json(e) => SaveFailure::Serialization(e),
            other => SaveFailure::Storage(StorageError::Backend(other.to_string())),
        }
    }

    fn new_session_id(&self) -> String {
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(9).collect();
        format!("session_{}_{suffix}", self.now_millis())
    }
}

/// A JSON value that is present and not `null`.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn first_present(fields: &Map<String, Value>, names: &[&str]) -> Option<Value> {
    names
        .iter()
        .find_map(|name| present(fields.get(*name)))
        .cloned()
}
