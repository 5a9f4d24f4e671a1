//! Deterministic fingerprints of birth records.
//!
//! A fingerprint is the CRC-32 of a canonical JSON rendering of the
//! record's identity projection. Canonical means object keys sorted at
//! every depth and no insignificant whitespace, so two semantically equal
//! records hash the same regardless of how the form ordered or formatted
//! them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::record::{self, BirthRecord};

/// Decimal places kept for coordinates in the identity projection.
pub const COORDINATE_PRECISION: usize = 6;

/// Hash of a record's identity fields, rendered as `h` + 8 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a record.
    pub fn of(record: &BirthRecord) -> Self {
        Self(hash_str(&canonical_json(&identity_projection(record))))
    }

    /// Wrap a fingerprint string read back from storage.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The fields that define "whose chart this is", normalized for hashing.
pub fn identity_projection(record: &BirthRecord) -> Value {
    let mut fields = Map::new();
    fields.insert(record::NAME.into(), Value::String(record.display_name().trim().to_string()));
    fields.insert(record::DATE_OF_BIRTH.into(), Value::String(record.date_of_birth.clone()));
    fields.insert(record::TIME_OF_BIRTH.into(), Value::String(record.time_of_birth.clone()));
    fields.insert(
        record::LATITUDE.into(),
        Value::String(format!("{:.*}", COORDINATE_PRECISION, record.latitude)),
    );
    fields.insert(
        record::LONGITUDE.into(),
        Value::String(format!("{:.*}", COORDINATE_PRECISION, record.longitude)),
    );
    fields.insert(record::TIMEZONE.into(), Value::String(record.timezone.clone()));
    Value::Object(fields)
}

/// Render a JSON value with object keys sorted at every depth.
///
/// Does not depend on the iteration order of `serde_json::Map`, which
/// changes when any crate in the build enables `preserve_order`.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(fields) => {
            let mut entries: Vec<(&String, &Value)> = fields.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, field)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => out.push_str(&i.to_string()),
            // 1.0 and 1 are the same number to every producer we read from
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => {
                out.push_str(&format!("{}", f as i64));
            }
            _ => out.push_str(&n.to_string()),
        },
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hash an arbitrary string to the fingerprint format.
pub fn hash_str(input: &str) -> String {
    format!("h{:08x}", crc32fast::hash(input.as_bytes()))
}
