//! Property-based tests for fingerprint determinism.
//!
//! Two records that describe the same person hash the same however the
//! form formatted them; changing any identity field changes the hash.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chart_cache::{BirthRecord, Fingerprint};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

fn identity() -> impl Strategy<Value = (String, String, String, f64, f64, String)> {
    (
        "[A-Z][a-z]{1,10}( [A-Z][a-z]{1,10})?",
        (1900u32..2030, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| format!("{y:04}-{m:02}-{d:02}")),
        (0u32..24, 0u32..60).prop_map(|(h, m)| format!("{h:02}:{m:02}")),
        -89.0f64..89.0,
        -179.0f64..179.0,
        prop::sample::select(vec!["Asia/Kolkata", "Europe/London", "America/New_York", "UTC"]),
    )
        .prop_map(|(name, date, time, lat, lon, tz)| (name, date, time, lat, lon, tz.to_string()))
}

fn as_json(
    (name, date, time, lat, lon, tz): &(String, String, String, f64, f64, String),
) -> Value {
    json!({
        "name": name,
        "dateOfBirth": date,
        "timeOfBirth": time,
        "latitude": lat,
        "longitude": lon,
        "timezone": tz,
    })
}

/// The same identity as a form might send it: fields in reverse order,
/// strings padded, coordinates as strings, plus non-identity extras.
fn as_form(
    (name, date, time, lat, lon, tz): &(String, String, String, f64, f64, String),
    pad: &str,
) -> Value {
    let mut fields = Map::new();
    fields.insert("placeOfBirth".into(), json!("Somewhere"));
    fields.insert("timezone".into(), json!(format!("{pad}{tz}{pad}")));
    fields.insert("longitude".into(), json!(format!("{pad}{lon}")));
    fields.insert("latitude".into(), json!(format!("{lat}{pad}")));
    fields.insert("timeOfBirth".into(), json!(format!("{pad}{time}")));
    fields.insert("dateOfBirth".into(), json!(format!("{date}{pad}")));
    fields.insert("name".into(), json!(format!("{pad}{name}{pad}")));
    fields.insert("gender".into(), json!("unspecified"));
    Value::Object(fields)
}

fn fingerprint(value: &Value) -> Fingerprint {
    Fingerprint::of(&BirthRecord::from_value(value).unwrap())
}

proptest! {
    #[test]
    fn fingerprint_is_deterministic(id in identity()) {
        let value = as_json(&id);
        prop_assert_eq!(fingerprint(&value), fingerprint(&value));
    }

    #[test]
    fn formatting_does_not_change_fingerprint(id in identity(), pad in "[ \t]{0,3}") {
        prop_assert_eq!(fingerprint(&as_json(&id)), fingerprint(&as_form(&id, &pad)));
    }

    #[test]
    fn fingerprint_format(id in identity()) {
        let fp = fingerprint(&as_json(&id));
        let raw = fp.as_str();
        prop_assert_eq!(raw.len(), 9);
        prop_assert!(raw.starts_with('h'));
        prop_assert!(raw[1..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn time_change_changes_fingerprint(id in identity(), shift in 1u32..60) {
        let original = as_json(&id);
        let mut changed = original.clone();
        let (hour, minute) = id.2.split_once(':').unwrap();
        let minute = (minute.parse::<u32>().unwrap() + shift) % 60;
        changed["timeOfBirth"] = json!(format!("{hour}:{minute:02}"));
        prop_assert_ne!(fingerprint(&original), fingerprint(&changed));
    }

    #[test]
    fn coordinate_change_changes_fingerprint(id in identity(), delta in 0.001f64..0.5) {
        let original = as_json(&id);

        let mut moved_north = original.clone();
        moved_north["latitude"] = json!(id.3 + delta);
        prop_assert_ne!(fingerprint(&original), fingerprint(&moved_north));

        let mut moved_east = original.clone();
        moved_east["longitude"] = json!(id.4 + delta);
        prop_assert_ne!(fingerprint(&original), fingerprint(&moved_east));
    }

    #[test]
    fn name_and_timezone_are_identity(id in identity()) {
        let original = as_json(&id);

        let mut renamed = original.clone();
        renamed["name"] = json!(format!("{} Jr", id.0));
        prop_assert_ne!(fingerprint(&original), fingerprint(&renamed));

        let mut relocated = original.clone();
        relocated["timezone"] = json!(if id.5 == "UTC" { "Asia/Tokyo" } else { "UTC" });
        prop_assert_ne!(fingerprint(&original), fingerprint(&relocated));
    }

    #[test]
    fn extra_fields_are_not_identity(id in identity(), place in "[A-Za-z ]{0,20}") {
        let original = as_json(&id);
        let mut annotated = original.clone();
        annotated["placeOfBirth"] = json!(place);
        prop_assert_eq!(fingerprint(&original), fingerprint(&annotated));
    }
}
