//! In-memory record filtering.
//!
//! The filter engine never touches the dispatcher: it runs over the enriched
//! collection already held by the record store and returns a fresh vector
//! every time. Active filters combine with AND; a key with no value (or an
//! empty one) constrains nothing.
//!
//! | Kind | Passes when |
//! |------|-------------|
//! | `text` | record text contains the filter text, ignoring case |
//! | `select` | record text equals the filter text |
//! | `date_range` | both bounds set and `lower < record date < upper` |
//!
//! Date-range bounds are exclusive on both ends: a record dated exactly on a
//! bound is filtered out.

use crate::model::Record;
use crate::schema::{FilterKind, FilterSpec, Schema};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use tracing::debug;

/// The current value of one filter widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// Used by `text` and `select` filters.
    Text(String),
    /// Used by `date_range` filters.
    Range(Option<NaiveDate>, Option<NaiveDate>),
}

impl FilterValue {
    pub fn text(value: impl Into<String>) -> Self {
        FilterValue::Text(value.into())
    }

    pub fn range(from: NaiveDate, to: NaiveDate) -> Self {
        FilterValue::Range(Some(from), Some(to))
    }

    /// Whether this value can constrain anything at all.
    pub fn is_active(&self) -> bool {
        match self {
            FilterValue::Text(s) => !s.is_empty(),
            FilterValue::Range(from, to) => from.is_some() && to.is_some(),
        }
    }
}

/// User-chosen filter constraints, keyed by filter field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    values: BTreeMap<String, FilterValue>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: FilterValue) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: FilterValue) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<FilterValue> {
        self.values.remove(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.values.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        !self.values.values().any(FilterValue::is_active)
    }
}

/// Return the records that satisfy every active filter.
pub fn apply(schema: &Schema, records: &[Record], state: &FilterState) -> Vec<Record> {
    let active: Vec<(&str, &FilterSpec, &FilterValue)> = state
        .iter()
        .filter(|(_, value)| value.is_active())
        .filter_map(|(key, value)| match schema.filter(key) {
            Some(spec) => Some((key, spec, value)),
            None => {
                debug!(filter = key, "no filter spec for key, ignoring");
                None
            }
        })
        .collect();

    records
        .iter()
        .filter(|record| {
            active
                .iter()
                .all(|(key, spec, value)| matches(spec, record, key, value))
        })
        .cloned()
        .collect()
}

/// Check one record against one filter.
pub fn matches(spec: &FilterSpec, record: &Record, key: &str, value: &FilterValue) -> bool {
    match (spec.kind, value) {
        (FilterKind::Text, FilterValue::Text(needle)) => record
            .text(key)
            .is_some_and(|hay| hay.to_lowercase().contains(&needle.to_lowercase())),
        (FilterKind::Select, FilterValue::Text(wanted)) => {
            record.text(key).is_some_and(|have| &have == wanted)
        }
        (FilterKind::DateRange, FilterValue::Range(Some(from), Some(to))) => {
            record.date(key).is_some_and(|date| {
                date > start_of_day(*from) && date < start_of_day(*to)
            })
        }
        // Incomplete range, or a value shape that does not fit the spec.
        _ => {
            debug!(filter = key, kind = spec.kind.name(), "filter value does not constrain");
            true
        }
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}
