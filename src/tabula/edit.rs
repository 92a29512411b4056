//! Form preparation and submission values.
//!
//! The form layer works on [`FormValues`], not on raw records: date fields
//! hold a structured [`NaiveDate`] (or nothing), everything else keeps its
//! JSON value. [`prepare_edit`] converts a stored record into form values,
//! [`FormValues::into_record`] converts back before a submit.

use crate::error::{Result, TabulaError};
use crate::model::{format_date, parse_date, Record};
use crate::schema::{FieldKind, Schema};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Date(Option<NaiveDate>),
    Value(Value),
}

/// Values of an open create/edit form. `id` is set in edit mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormValues {
    pub id: Option<String>,
    pub values: BTreeMap<String, FormValue>,
}

/// Convert a stored record into the values an edit form starts from.
///
/// Date fields become structured dates; absent or unparseable dates become
/// `Date(None)`. Computed and action columns are dropped.
pub fn prepare_edit(schema: &Schema, record: &Record) -> FormValues {
    let mut values = BTreeMap::new();
    for field in schema.fields() {
        match &field.kind {
            FieldKind::Computed(_) | FieldKind::Action => {}
            FieldKind::Date => {
                let date = record
                    .get(&field.key)
                    .and_then(Value::as_str)
                    .and_then(parse_date);
                values.insert(field.key.clone(), FormValue::Date(date));
            }
            _ => {
                if let Some(value) = record.get(&field.key) {
                    values.insert(field.key.clone(), FormValue::Value(value.clone()));
                }
            }
        }
    }
    FormValues {
        id: record.id.clone(),
        values,
    }
}

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FormValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: FormValue) {
        self.values.insert(key.into(), value);
    }

    /// Overlay `other` on top of these values. The id of `self` is kept.
    pub fn merge(&mut self, other: FormValues) {
        self.values.extend(other.values);
    }

    /// Serialize back into a record for the dispatcher.
    pub fn into_record(self) -> Record {
        let mut record = Record {
            id: self.id,
            ..Record::default()
        };
        for (key, value) in self.values {
            let value = match value {
                FormValue::Date(Some(date)) => Value::String(format_date(date)),
                FormValue::Date(None) => Value::Null,
                FormValue::Value(v) => v,
            };
            record.insert(key, value);
        }
        record
    }

    /// Build form values from `key=value` pairs, coercing each value by its
    /// field kind.
    pub fn from_pairs<S: AsRef<str>>(schema: &Schema, pairs: &[S]) -> Result<Self> {
        let mut form = FormValues::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, raw) = pair.split_once('=').ok_or_else(|| {
                TabulaError::Cli(format!("expected key=value, got `{}`", pair))
            })?;
            let key = key.trim();
            let field = schema
                .field(key)
                .ok_or_else(|| TabulaError::Cli(format!("unknown field `{}`", key)))?;
            let value = coerce(&field.kind, key, raw)?;
            form.set(key, value);
        }
        Ok(form)
    }
}

fn coerce(kind: &FieldKind, key: &str, raw: &str) -> Result<FormValue> {
    let raw = raw.trim();
    match kind {
        FieldKind::Computed(_) | FieldKind::Action => Err(TabulaError::Cli(format!(
            "`{}` is {} and cannot be set",
            key,
            kind.name()
        ))),
        FieldKind::Date if raw.is_empty() => Ok(FormValue::Date(None)),
        FieldKind::Date => parse_date(raw)
            .map(|d| FormValue::Date(Some(d)))
            .ok_or_else(|| TabulaError::Cli(format!("`{}` is not a date: {}", key, raw))),
        FieldKind::Number if raw.is_empty() => Ok(FormValue::Value(Value::Null)),
        FieldKind::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(|n| FormValue::Value(number_value(n)))
            .ok_or_else(|| TabulaError::Cli(format!("`{}` is not a number: {}", key, raw))),
        _ if kind.is_closed_set() && !raw.is_empty() => {
            if kind.options().iter().any(|o| o == raw) {
                Ok(FormValue::Value(Value::String(raw.to_string())))
            } else {
                Err(TabulaError::Cli(format!(
                    "`{}` must be one of: {}",
                    key,
                    kind.options().join(", ")
                )))
            }
        }
        _ => Ok(FormValue::Value(Value::String(raw.to_string()))),
    }
}

/// Keep whole numbers integral so `1000` does not round-trip as `1000.0`.
fn number_value(n: serde_json::Number) -> Value {
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::from(f as i64),
        _ => Value::Number(n),
    }
}
