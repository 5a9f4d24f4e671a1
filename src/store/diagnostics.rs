//! Read-only inspection and explicit cleanup of stored state.
//!
//! Diagnostics and integrity checks never clear anything, even when they
//! find expired or corrupt canonical values. Cleanup only removes what its
//! [`CleanupOptions`] ask for.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::{SessionStore, read_raw, remove_quietly};
use crate::fingerprint::Fingerprint;
use crate::keys::{
    CanonicalKey, LegacyKey, is_recognized_preference_key, is_recognized_session_key,
};
use crate::logging::info;
use crate::record::BirthRecord;
use crate::storage::StorageScope;
use crate::ttl::{self, Freshness};

/// Availability and footprint of one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeReport {
    pub name: String,
    pub available: bool,
    pub entries: usize,
    pub bytes: usize,
    pub quota: Option<usize>,
}

impl ScopeReport {
    fn of(scope: &dyn StorageScope) -> Self {
        let usage = scope.usage().unwrap_or_default();
        Self {
            name: scope.name().to_string(),
            available: scope.is_available(),
            entries: usage.entries,
            bytes: usage.bytes,
            quota: scope.quota(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyPresence {
    pub key: &'static str,
    pub present: bool,
}

/// Where the stored envelope sits in its TTL window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtlStatus {
    pub saved_at: String,
    pub age_secs: u64,
    pub remaining_secs: u64,
    pub expired: bool,
}

/// Snapshot of everything the store keeps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub page_load_id: String,
    /// Page load id written with the stored envelope.
    pub stored_page_load_id: Option<String>,
    pub generated_at: String,
    pub schema_version: String,
    pub ttl_secs: u64,
    pub session: ScopeReport,
    pub preferences: ScopeReport,
    pub canonical_keys: Vec<KeyPresence>,
    pub ttl: Option<TtlStatus>,
    pub stored_fingerprint: Option<String>,
    pub computed_fingerprint: Option<String>,
    pub legacy_keys: Vec<&'static str>,
}

impl Diagnostics {
    /// `None` when either side of the comparison is missing.
    pub fn fingerprint_matches(&self) -> Option<bool> {
        match (&self.stored_fingerprint, &self.computed_fingerprint) {
            (Some(stored), Some(computed)) => Some(stored == computed),
            _ => None,
        }
    }
}

/// One problem found by [`SessionStore::verify_storage_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    MissingCanonicalKey { key: &'static str },
    CorruptValue { key: &'static str, reason: String },
    SchemaMismatch { stored: String, expected: String },
    FingerprintMismatch { stored: String, computed: String },
    Expired { age_secs: u64 },
    OrphanChartId,
    LegacyKeysPresent { keys: Vec<&'static str> },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCanonicalKey { key } => write!(f, "canonical key '{key}' is missing"),
            Self::CorruptValue { key, reason } => write!(f, "'{key}' is corrupt: {reason}"),
            Self::SchemaMismatch { stored, expected } => {
                write!(f, "schema '{stored}' does not match '{expected}'")
            }
            Self::FingerprintMismatch { stored, computed } => {
                write!(f, "stored fingerprint {stored} does not match computed {computed}")
            }
            Self::Expired { age_secs } => write!(f, "envelope expired ({age_secs}s old)"),
            Self::OrphanChartId => f.write_str("chart id stored without a birth record"),
            Self::LegacyKeysPresent { keys } => {
                write!(f, "legacy keys present: {}", keys.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// What [`SessionStore::run_storage_cleanup`] may remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Remove preference entries past their maximum age.
    pub purge_expired_preferences: bool,
    /// Remove keys no layout of this crate recognizes.
    pub purge_unrecognized: bool,
    /// Clear canonical state when the envelope is expired or corrupt.
    pub purge_stale_envelope: bool,
    /// Report what would be removed without removing it.
    pub dry_run: bool,
}

impl CleanupOptions {
    /// Every purge enabled.
    pub fn all() -> Self {
        Self {
            purge_expired_preferences: true,
            purge_unrecognized: true,
            purge_stale_envelope: true,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub dry_run: bool,
    pub expired_preferences: Vec<String>,
    pub unrecognized_session: Vec<String>,
    pub unrecognized_preferences: Vec<String>,
    /// Whether a stale envelope was (or would be) cleared.
    pub stale_envelope: bool,
}

impl CleanupReport {
    pub fn removed(&self) -> usize {
        self.expired_preferences.len()
            + self.unrecognized_session.len()
            + self.unrecognized_preferences.len()
    }
}

impl SessionStore {
    pub fn get_diagnostics(&self) -> Diagnostics {
        let session = self.session_scope();

        let canonical_keys = CanonicalKey::ALL
            .into_iter()
            .map(|key| KeyPresence {
                key: key.as_str(),
                present: read_raw(session, key.as_str()).is_some(),
            })
            .collect();

        let ttl = read_raw(session, CanonicalKey::UpdatedAt.as_str()).and_then(|saved_at| {
            let parsed = ttl::parse_iso(&saved_at)?;
            let (age, remaining, expired) =
                match Freshness::evaluate(parsed, self.now(), self.config.ttl()) {
                    Freshness::Fresh { age, remaining } => (age, remaining, false),
                    Freshness::Expired { age } => (age, std::time::Duration::ZERO, true),
                };
            Some(TtlStatus {
                saved_at,
                age_secs: age.as_secs(),
                remaining_secs: remaining.as_secs(),
                expired,
            })
        });

        Diagnostics {
            page_load_id: self.page_load_id.clone(),
            stored_page_load_id: read_raw(session, CanonicalKey::PageLoadId.as_str()),
            generated_at: self.now_iso(),
            schema_version: self.config.schema_version.clone(),
            ttl_secs: self.config.ttl_secs,
            session: ScopeReport::of(session),
            preferences: ScopeReport::of(self.preference_scope()),
            canonical_keys,
            ttl,
            stored_fingerprint: read_raw(session, CanonicalKey::Fingerprint.as_str()),
            computed_fingerprint: self
                .stored_record()
                .and_then(Result::ok)
                .map(|record| Fingerprint::of(&record).into_string()),
            legacy_keys: self.stray_legacy_keys(),
        }
    }

    /// Check stored state for anything a read would reject.
    pub fn verify_storage_integrity(&self) -> IntegrityReport {
        let session = self.session_scope();
        let mut issues = Vec::new();

        let has_record = read_raw(session, CanonicalKey::BirthData.as_str()).is_some();
        if has_record {
            for key in CanonicalKey::ENVELOPE {
                if read_raw(session, key.as_str()).is_none() {
                    issues.push(IntegrityIssue::MissingCanonicalKey { key: key.as_str() });
                }
            }
        } else if read_raw(session, CanonicalKey::ChartId.as_str()).is_some() {
            issues.push(IntegrityIssue::OrphanChartId);
        }

        if let Some(stored) = read_raw(session, CanonicalKey::Schema.as_str())
            && stored != self.config.schema_version
        {
            issues.push(IntegrityIssue::SchemaMismatch {
                stored,
                expected: self.config.schema_version.clone(),
            });
        }

        if let Some(saved_at) = read_raw(session, CanonicalKey::UpdatedAt.as_str()) {
            match ttl::parse_iso(&saved_at) {
                Some(parsed) => {
                    if let Freshness::Expired { age } =
                        Freshness::evaluate(parsed, self.now(), self.config.ttl())
                    {
                        issues.push(IntegrityIssue::Expired {
                            age_secs: age.as_secs(),
                        });
                    }
                }
                None => issues.push(IntegrityIssue::CorruptValue {
                    key: CanonicalKey::UpdatedAt.as_str(),
                    reason: format!("'{saved_at}' is not an RFC 3339 timestamp"),
                }),
            }
        }

        match self.stored_record() {
            Some(Ok(record)) => {
                let computed = Fingerprint::of(&record);
                if let Some(stored) = read_raw(session, CanonicalKey::Fingerprint.as_str())
                    && stored != computed.as_str()
                {
                    issues.push(IntegrityIssue::FingerprintMismatch {
                        stored,
                        computed: computed.into_string(),
                    });
                }
            }
            Some(Err(reason)) => issues.push(IntegrityIssue::CorruptValue {
                key: CanonicalKey::BirthData.as_str(),
                reason,
            }),
            None => {}
        }

        let legacy = self.stray_legacy_keys();
        if !legacy.is_empty() {
            issues.push(IntegrityIssue::LegacyKeysPresent { keys: legacy });
        }

        IntegrityReport { issues }
    }

    /// Remove what `options` asks for and report it.
    pub fn run_storage_cleanup(&self, options: CleanupOptions) -> CleanupReport {
        let mut report = CleanupReport {
            dry_run: options.dry_run,
            ..CleanupReport::default()
        };

        if options.purge_stale_envelope {
            let stale = self.verify_storage_integrity().issues.iter().any(|issue| {
                matches!(
                    issue,
                    IntegrityIssue::Expired { .. }
                        | IntegrityIssue::CorruptValue { .. }
                        | IntegrityIssue::SchemaMismatch { .. }
                        | IntegrityIssue::MissingCanonicalKey { .. }
                        | IntegrityIssue::FingerprintMismatch { .. }
                )
            });
            if stale && !options.dry_run {
                self.clear();
            }
            report.stale_envelope = stale;
        }

        if options.purge_expired_preferences {
            report.expired_preferences = self.expired_preference_keys();
        }

        if options.purge_unrecognized {
            report.unrecognized_session = unrecognized(self.session_scope(), is_recognized_session_key);
            report.unrecognized_preferences =
                unrecognized(self.preference_scope(), is_recognized_preference_key);
        }

        if !options.dry_run {
            for key in &report.expired_preferences {
                remove_quietly(self.preference_scope(), key);
            }
            for key in &report.unrecognized_session {
                remove_quietly(self.session_scope(), key);
            }
            for key in &report.unrecognized_preferences {
                remove_quietly(self.preference_scope(), key);
            }
        }

        info!(
            removed = report.removed(),
            stale_envelope = report.stale_envelope,
            dry_run = options.dry_run,
            "storage cleanup finished"
        );
        report
    }

    /// The stored record decoded without TTL or schema checks.
    fn stored_record(&self) -> Option<Result<BirthRecord, String>> {
        let raw = read_raw(self.session_scope(), CanonicalKey::BirthData.as_str())?;
        Some(
            serde_json::from_str::<Value>(&raw)
                .map_err(|e| e.to_string())
                .and_then(|value| BirthRecord::from_value(&value).map_err(|e| e.to_string())),
        )
    }

    /// Legacy sources still holding a payload. The session record's
    /// `birthData` mirror only counts while no canonical record exists.
    fn stray_legacy_keys(&self) -> Vec<&'static str> {
        let has_record =
            read_raw(self.session_scope(), CanonicalKey::BirthData.as_str()).is_some();
        self.legacy_keys_present()
            .into_iter()
            .filter(|key| !(has_record && key.is_embedded()))
            .map(LegacyKey::as_str)
            .collect()
    }
}

fn unrecognized(scope: &dyn StorageScope, recognized: fn(&str) -> bool) -> Vec<String> {
    scope
        .keys()
        .unwrap_or_default()
        .into_iter()
        .filter(|key| !recognized(key))
        .collect()
}
