//! Field lookup over loosely-typed report payloads.
//!
//! Mobile clients disagree on field names, so every logical field is resolved through an
//! alias list; the first alias holding a usable value wins.

use serde_json::{Map, Value};

use crate::models::Location;

pub const TYPE_FIELDS: &[&str] = &["tipo", "type", "incident_type", "incidentType"];
pub const DESCRIPTION_FIELDS: &[&str] = &["descripcion", "description", "detalle"];
pub const SCORE_FIELDS: &[&str] = &[
    "smart_score",
    "smartScore",
    "severity_score",
    "severityScore",
    "score",
    "puntaje",
];
pub const CATEGORY_FIELDS: &[&str] = &["severidad", "severity", "nivel", "level", "categoria", "category"];
pub const LATITUDE_FIELDS: &[&str] = &["latitude", "lat", "latitud"];
pub const LONGITUDE_FIELDS: &[&str] = &["longitude", "lng", "lon", "longitud"];
pub const ZONE_FIELDS: &[&str] = &["zona", "zone"];
pub const CLIENT_ID_FIELDS: &[&str] = &["client_id", "clientId", "uuid", "local_id"];
pub const REPORTED_AT_FIELDS: &[&str] = &["timestamp", "reported_at", "reportedAt", "fecha"];

/// First non-blank string among the aliases. Numbers are accepted and stringified.
pub fn first_text(payload: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| match payload.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// First finite number among the aliases; numeric strings are parsed
pub fn first_number(payload: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    aliases.iter().find_map(|key| {
        let number = match payload.get(*key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        number.is_finite().then_some(number)
    })
}

/// Coordinates only when both halves are present
pub fn location(payload: &Map<String, Value>) -> Option<Location> {
    let latitude = first_number(payload, LATITUDE_FIELDS)?;
    let longitude = first_number(payload, LONGITUDE_FIELDS)?;
    Some(Location {
        latitude,
        longitude,
    })
}

/// True when exactly one coordinate was supplied
pub fn has_partial_location(payload: &Map<String, Value>) -> bool {
    first_number(payload, LATITUDE_FIELDS).is_some()
        != first_number(payload, LONGITUDE_FIELDS).is_some()
}

/// Case-folded concatenation of every scalar value in the payload
pub fn search_blob(payload: &Value) -> String {
    let mut parts = Vec::new();
    match payload {
        Value::Object(map) => {
            for value in map.values() {
                push_scalar(value, &mut parts);
            }
        }
        other => push_scalar(other, &mut parts),
    }
    parts.join(" ").to_lowercase()
}

fn push_scalar(value: &Value, parts: &mut Vec<String>) {
    match value {
        Value::String(s) => parts.push(s.clone()),
        Value::Number(n) => parts.push(n.to_string()),
        Value::Bool(b) => parts.push(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => {}
    }
}
