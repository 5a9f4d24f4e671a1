//! The birth record: who a chart belongs to.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field names of the identity part of a record, as they appear in JSON.
pub const NAME: &str = "name";
pub const DATE_OF_BIRTH: &str = "dateOfBirth";
pub const TIME_OF_BIRTH: &str = "timeOfBirth";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const TIMEZONE: &str = "timezone";

const IDENTITY_FIELDS: [&str; 6] = [NAME, DATE_OF_BIRTH, TIME_OF_BIRTH, LATITUDE, LONGITUDE, TIMEZONE];

/// Why a candidate record was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("birth record must be a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    Missing(&'static str),

    #[error("field '{field}' is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("field '{field}' = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// A fully validated birth record.
///
/// Identity fields are normalized: strings trimmed, an empty name dropped,
/// coordinates coerced to `f64`. Any other fields the form sent (place of
/// birth, gender, ...) ride along in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BirthRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub date_of_birth: String,
    pub time_of_birth: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BirthRecord {
    /// Build a record from typed parts. Call [`validate`](Self::validate)
    /// or go through [`from_value`](Self::from_value) before storing.
    pub fn new(
        date_of_birth: impl Into<String>,
        time_of_birth: impl Into<String>,
        latitude: f64,
        longitude: f64,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            date_of_birth: date_of_birth.into(),
            time_of_birth: time_of_birth.into(),
            latitude,
            longitude,
            timezone: timezone.into(),
            extra: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a non-identity field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Validate and normalize an arbitrary JSON value.
    pub fn from_value(candidate: &Value) -> Result<Self, ValidationError> {
        let Value::Object(fields) = candidate else {
            return Err(ValidationError::NotAnObject);
        };

        let name = match fields.get(NAME) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Some(other) => {
                return Err(ValidationError::Invalid {
                    field: NAME,
                    reason: format!("expected a string, got {}", json_kind(other)),
                });
            }
        };

        let record = Self {
            name,
            date_of_birth: required_string(fields, DATE_OF_BIRTH)?,
            time_of_birth: required_string(fields, TIME_OF_BIRTH)?,
            latitude: coordinate(fields, LATITUDE, 90.0)?,
            longitude: coordinate(fields, LONGITUDE, 180.0)?,
            timezone: required_string(fields, TIMEZONE)?,
            extra: fields
                .iter()
                .filter(|(k, _)| !IDENTITY_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };

        Ok(record)
    }

    /// Re-check a typed record and return its normalized form.
    pub fn validate(&self) -> Result<Self, ValidationError> {
        Self::from_value(&self.to_value())
    }

    /// Serialize to a JSON object.
    pub fn to_value(&self) -> Value {
        // Serializing plain strings, finite floats and a JSON map cannot
        // fail; fall back to null rather than panic on non-finite input.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Name trimmed, or empty when absent.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

fn required_string(fields: &Map<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(ValidationError::Missing(field)),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Err(ValidationError::Missing(field))
            } else {
                Ok(trimmed.to_string())
            }
        }
        Some(other) => Err(ValidationError::Invalid {
            field,
            reason: format!("expected a string, got {}", json_kind(other)),
        }),
    }
}

fn coordinate(fields: &Map<String, Value>, field: &'static str, bound: f64) -> Result<f64, ValidationError> {
    let value = match fields.get(field) {
        None | Some(Value::Null) => return Err(ValidationError::Missing(field)),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| ValidationError::Invalid {
            field,
            reason: format!("{n} is not representable as a float"),
        })?,
        Some(Value::String(s)) if s.trim().is_empty() => return Err(ValidationError::Missing(field)),
        Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| ValidationError::Invalid {
            field,
            reason: format!("'{s}' is not a number"),
        })?,
        Some(other) => {
            return Err(ValidationError::Invalid {
                field,
                reason: format!("expected a number, got {}", json_kind(other)),
            });
        }
    };

    if !value.is_finite() {
        return Err(ValidationError::Invalid {
            field,
            reason: "must be finite".to_string(),
        });
    }
    if !(-bound..=bound).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min: -bound,
            max: bound,
        });
    }
    Ok(value)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mumbai() -> Value {
        json!({
            "name": "  Test User ",
            "dateOfBirth": "1990-01-01",
            "timeOfBirth": "12:00",
            "placeOfBirth": "Mumbai, India",
            "latitude": 19.076,
            "longitude": 72.8777,
            "timezone": "Asia/Kolkata"
        })
    }

    #[test]
    fn test_valid_record_is_normalized() {
        let record = BirthRecord::from_value(&mumbai()).unwrap();
        assert_eq!(record.name.as_deref(), Some("Test User"));
        assert_eq!(record.latitude, 19.076);
        assert_eq!(record.extra.get("placeOfBirth"), Some(&json!("Mumbai, India")));
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let mut value = mumbai();
        value["latitude"] = json!(" 19.076 ");
        value["longitude"] = json!("72.8777");
        let record = BirthRecord::from_value(&value).unwrap();
        assert_eq!(record.latitude, 19.076);
        assert_eq!(record.longitude, 72.8777);
    }

    #[test]
    fn test_blank_name_is_dropped() {
        let mut value = mumbai();
        value["name"] = json!("   ");
        let record = BirthRecord::from_value(&value).unwrap();
        assert_eq!(record.name, None);
        assert!(!record.to_value().as_object().unwrap().contains_key("name"));
    }

    #[test]
    fn test_rejections() {
        assert_eq!(BirthRecord::from_value(&json!(null)), Err(ValidationError::NotAnObject));
        assert_eq!(BirthRecord::from_value(&json!("string")), Err(ValidationError::NotAnObject));
        assert_eq!(BirthRecord::from_value(&json!(123)), Err(ValidationError::NotAnObject));
        assert_eq!(
            BirthRecord::from_value(&json!({})),
            Err(ValidationError::Missing(DATE_OF_BIRTH))
        );

        let mut value = mumbai();
        value["timezone"] = json!("");
        assert_eq!(BirthRecord::from_value(&value), Err(ValidationError::Missing(TIMEZONE)));

        let mut value = mumbai();
        value["latitude"] = json!(90.5);
        assert!(matches!(
            BirthRecord::from_value(&value),
            Err(ValidationError::OutOfRange { field: LATITUDE, .. })
        ));

        let mut value = mumbai();
        value["longitude"] = json!("east");
        assert!(matches!(
            BirthRecord::from_value(&value),
            Err(ValidationError::Invalid { field: LONGITUDE, .. })
        ));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let mut value = mumbai();
        value["latitude"] = json!(-90);
        value["longitude"] = json!(180);
        assert!(BirthRecord::from_value(&value).is_ok());
    }

    #[test]
    fn test_serde_roundtrip_keeps_extra_fields() {
        let record = BirthRecord::from_value(&mumbai()).unwrap();
        let text = serde_json::to_string(&record).unwrap();
        let back: BirthRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
