//! What a canonical read hands back.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::fingerprint::Fingerprint;
use crate::keys::CanonicalKey;
use crate::record::BirthRecord;
use crate::ttl;

/// Metadata persisted next to a birth record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMeta {
    /// RFC 3339 time of the last canonical write.
    #[serde(rename = "savedAtISO")]
    pub saved_at_iso: String,
    pub fingerprint: Fingerprint,
    pub schema_version: String,
}

impl EnvelopeMeta {
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        ttl::parse_iso(&self.saved_at_iso)
    }
}

/// A birth record together with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub data: BirthRecord,
    pub meta: EnvelopeMeta,
}

/// Outcome of reading the canonical envelope.
///
/// [`SessionStore::get_birth_data`](crate::SessionStore::get_birth_data)
/// collapses everything but `Found` to `None`; callers that need to tell
/// "never stored" from "corrupt" use
/// [`lookup_birth_data`](crate::SessionStore::lookup_birth_data).
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Envelope),
    /// No birth record is stored and no legacy record could be migrated.
    Absent,
    /// The envelope was older than the TTL and has been cleared.
    Expired { age: Duration },
    /// The envelope carried another schema tag and has been cleared.
    SchemaMismatch { stored: String },
    /// A canonical value could not be decoded; canonical state was cleared.
    Corrupt { key: CanonicalKey, reason: String },
    /// The session scope does not exist.
    Unavailable,
}

impl Lookup {
    pub fn found(self) -> Option<Envelope> {
        match self {
            Self::Found(envelope) => Some(envelope),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}
