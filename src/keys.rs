//! Registry of every storage key the store reads or writes.
//!
//! Keys are never assembled at call sites. Canonical keys are an enum whose
//! full names are static strings, so a schema bump is a one-line change to
//! [`CANONICAL_PREFIX`] and the string literals below.

use std::fmt;

/// Prefix shared by all canonical keys.
pub const CANONICAL_PREFIX: &str = "btr:v2:";

/// Session-scoped key holding the loosely-typed session record.
pub const SESSION_KEY: &str = "current_session";

/// Session-scoped key holding the last generated chart tuple.
pub const LAST_CHART_KEY: &str = "btr:v2:lastChart";

/// Prefix of all preference keys in the long-lived scope.
pub const PREFERENCE_PREFIX: &str = "jyotish_shastra_data_";

/// Prefix of timestamped API payload keys in the session scope.
pub const API_PREFIX: &str = "jyotish_api_";

/// Prefix of timestamped chart payloads.
pub const API_CHART_PREFIX: &str = "jyotish_api_chart_";

/// Prefix of timestamped comprehensive analysis payloads.
pub const API_COMPREHENSIVE_PREFIX: &str = "jyotish_api_analysis_comprehensive_";

/// Prefix of timestamped individual analysis payloads.
pub const API_ANALYSIS_PREFIX: &str = "jyotish_api_analysis_";

/// The fixed set of keys that together make up the current envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalKey {
    BirthData,
    UpdatedAt,
    Fingerprint,
    Schema,
    ChartId,
    PageLoadId,
}

impl CanonicalKey {
    /// All canonical keys, in write order.
    pub const ALL: [CanonicalKey; 6] = [
        CanonicalKey::BirthData,
        CanonicalKey::UpdatedAt,
        CanonicalKey::Fingerprint,
        CanonicalKey::Schema,
        CanonicalKey::ChartId,
        CanonicalKey::PageLoadId,
    ];

    /// Keys that must all be present for an envelope to be readable.
    pub const ENVELOPE: [CanonicalKey; 4] = [
        CanonicalKey::BirthData,
        CanonicalKey::UpdatedAt,
        CanonicalKey::Fingerprint,
        CanonicalKey::Schema,
    ];

    /// Full storage key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BirthData => "btr:v2:birthData",
            Self::UpdatedAt => "btr:v2:updatedAt",
            Self::Fingerprint => "btr:v2:fingerprint",
            Self::Schema => "btr:v2:schema",
            Self::ChartId => "btr:v2:chartId",
            Self::PageLoadId => "btr:v2:pageLoadId",
        }
    }

    /// Short name (the suffix after [`CANONICAL_PREFIX`]).
    pub fn suffix(self) -> &'static str {
        self.as_str()
            .strip_prefix(CANONICAL_PREFIX)
            .unwrap_or(self.as_str())
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which scope a legacy key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyScope {
    Session,
    Preferences,
}

/// Keys from the storage layout that predates the canonical envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyKey {
    /// Session key holding a bare record or a `{data, chartId}` wrapper.
    BirthDataSession,
    /// Session key holding a bare record or a `{data, chartId}` wrapper.
    BirthData,
    /// The `birthData` field of the session record.
    SessionField,
    /// Form persistence copy in the preference scope.
    PersistedBirthData,
}

impl LegacyKey {
    /// Migration sources, in the order they are consulted.
    pub const ALL: [LegacyKey; 4] = [
        LegacyKey::BirthDataSession,
        LegacyKey::BirthData,
        LegacyKey::SessionField,
        LegacyKey::PersistedBirthData,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BirthDataSession => "birth_data_session",
            Self::BirthData => "birthData",
            Self::SessionField => SESSION_KEY,
            Self::PersistedBirthData => "jyotish_shastra_data_birthData",
        }
    }

    pub const fn scope(self) -> LegacyScope {
        match self {
            Self::PersistedBirthData => LegacyScope::Preferences,
            _ => LegacyScope::Session,
        }
    }

    /// Whether this source is a field inside a shared record rather than a
    /// key of its own. Such sources are stripped, never deleted.
    pub const fn is_embedded(self) -> bool {
        matches!(self, Self::SessionField)
    }
}

/// Full key of a preference entry.
pub fn preference_key(name: &str) -> String {
    format!("{PREFERENCE_PREFIX}{name}")
}

/// Timestamped key for a chart payload.
pub fn api_chart_key(millis: i64) -> String {
    format!("{API_CHART_PREFIX}generate_{millis}")
}

/// Timestamped key for a comprehensive analysis payload.
pub fn api_comprehensive_key(millis: i64) -> String {
    format!("{API_COMPREHENSIVE_PREFIX}{millis}")
}

/// Timestamped key for an individual analysis payload.
pub fn api_analysis_key(analysis_type: &str, millis: i64) -> String {
    format!("{API_ANALYSIS_PREFIX}{analysis_type}_{millis}")
}

/// Prefix under which individual analyses of one type are stored.
pub fn api_analysis_prefix(analysis_type: &str) -> String {
    format!("{API_ANALYSIS_PREFIX}{analysis_type}_")
}

/// Whether a session-scope key belongs to any layout this crate knows.
pub fn is_recognized_session_key(key: &str) -> bool {
    key.starts_with(CANONICAL_PREFIX)
        || key.starts_with(API_PREFIX)
        || key == SESSION_KEY
        || LegacyKey::ALL
            .iter()
            .any(|l| l.scope() == LegacyScope::Session && l.as_str() == key)
}

/// Whether a preference-scope key belongs to any layout this crate knows.
pub fn is_recognized_preference_key(key: &str) -> bool {
    key.starts_with(PREFERENCE_PREFIX)
}

/// Pick the most recent key among timestamped keys sharing a prefix.
///
/// The trailing `_<millis>` component is compared numerically so that a
/// longer timestamp always wins over a shorter one.
pub fn latest_timestamped(keys: &[String]) -> Option<&String> {
    keys.iter().max_by_key(|k| {
        k.rsplit('_')
            .next()
            .and_then(|t| t.parse::<i64>().ok())
            .unwrap_or(i64::MIN)
    })
}
