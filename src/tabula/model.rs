//! Records and the value helpers shared by the evaluator, the filter engine
//! and the form layer.
//!
//! A [`Record`] is a flat JSON object with an optional `id`. Field values stay
//! as [`serde_json::Value`] because the remote store is loosely typed: the same
//! column can come back as `1000`, `"1000"` or `""` depending on who wrote it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Serialized date format written back to the store.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single row of a collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_id"
    )]
    pub id: Option<String>,

    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            values: Map::new(),
        }
    }

    /// Builder-style setter, mostly used by tests and the built-in schemas.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Numeric view of a field (see [`as_number`]).
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(as_number)
    }

    /// Textual view of a field (see [`as_text`]).
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(as_text)
    }

    /// Date view of a field (see [`as_date`]).
    pub fn date(&self, key: &str) -> Option<NaiveDateTime> {
        self.get(key).and_then(as_date)
    }

    /// Build a record from an arbitrary JSON object.
    ///
    /// The `id` key is lifted out of the value map; numeric ids are stringified.
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        let id = object.remove("id").and_then(|v| id_from_value(&v));
        Self { id, values: object }
    }
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_from_value))
}

/// Whether a value counts as "blank" for rule checks and filter state.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Numeric view of a value.
///
/// Accepts JSON numbers and numeric strings. Blank strings and anything else
/// yield `None`.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Textual view of a scalar value. Objects, arrays and null yield `None`.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Date view of a value. Only strings are parsed (see [`parse_date_time`]).
pub fn as_date(value: &Value) -> Option<NaiveDateTime> {
    value.as_str().and_then(parse_date_time)
}

/// Parse the serialized date forms the store produces.
///
/// Plain `YYYY-MM-DD` dates land at midnight; RFC 3339 timestamps keep their
/// wall-clock time with the offset dropped.
pub fn parse_date_time(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, DATE_FORMAT) {
        return Some(date.and_time(NaiveTime::MIN));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.naive_local());
    }
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Parse a serialized date down to its calendar day.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    parse_date_time(input).map(|dt| dt.date())
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
