//! Computed-field evaluation.
//!
//! [`enrich`] turns raw records (straight from the dispatcher) into enriched
//! ones by running every computed field of the schema. Fields run in the
//! dependency order fixed when the schema was built, and each compute
//! function sees the record as enriched by the computed fields before it.
//!
//! A failing compute function only nulls its own field on its own record:
//! the rest of the record and the rest of the collection are unaffected.

use crate::model::Record;
use crate::schema::Schema;
use serde_json::Value;
use tracing::warn;

/// Apply every computed field to every record.
pub fn enrich(schema: &Schema, records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .map(|record| enrich_record(schema, record))
        .collect()
}

/// Apply every computed field to one record.
pub fn enrich_record(schema: &Schema, mut record: Record) -> Record {
    for (key, computed) in schema.computed_fields() {
        let value = match (computed.compute)(&record) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    collection = schema.collection(),
                    field = key,
                    record_id = record.id.as_deref().unwrap_or("-"),
                    error = %err,
                    "computed field failed"
                );
                Value::Null
            }
        };
        record.insert(key, value);
    }
    record
}
