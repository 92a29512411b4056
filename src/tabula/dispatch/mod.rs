//! # Action Dispatch
//!
//! The remote store is an opaque collaborator reached through one typed
//! request: `{action, sheetName, id, data, headers}`. Whatever the action, a
//! successful reply carries the **entire** resulting collection, never a
//! delta. The record store treats every reply as an authoritative snapshot
//! and replaces its collection wholesale.
//!
//! ## Layers
//!
//! - [`Dispatcher`]: the transport. Sends a request, returns the raw body.
//! - [`ActionClient`]: the adapter the core talks to. Builds requests, parses
//!   and normalises replies into `Vec<Record>`, and logs failures.
//!
//! ## Implementations
//!
//! - [`fs::FileDispatcher`]: a local stand-in for the remote store, one JSON
//!   file per collection. Used by the CLI.
//! - [`memory::MemDispatcher`]: in-memory, with failure injection, scripted
//!   delays and a request log. Used by tests.
//!
//! ## Reply Shapes
//!
//! Script back ends are loose about what they send back. [`normalize`]
//! accepts:
//!
//! | Body | Result |
//! |------|--------|
//! | `[{...}, ...]` | one record per object |
//! | `{"id": ..., ...}` | a single record |
//! | `{"k1": {...}, "k2": {...}}` | one record per value, key used as id when missing |
//! | `"<json>"` | decoded once more, then as above |
//! | `{}` | empty collection |
//! | `null` | empty collection |
//!
//! Anything else is a [`TabulaError::MalformedResponse`].

use crate::error::{Result, TabulaError};
use crate::model::Record;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, warn};

pub mod fs;
pub mod memory;

/// The four operations the remote store understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    GetAll,
    Add,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::GetAll => "getAll",
            Action::Add => "add",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Wire shape of a dispatch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: Action,
    pub sheet_name: String,
    pub id: Option<String>,
    pub data: Option<Record>,
    pub headers: Vec<String>,
}

/// Transport to the remote store.
///
/// Returns the serialized reply body. Timeouts and retries, if any, belong to
/// the implementation; the core issues each request once.
#[async_trait(?Send)]
pub trait Dispatcher {
    async fn send(&self, request: &ActionRequest) -> Result<String>;
}

/// The adapter between the core and a [`Dispatcher`].
pub struct ActionClient<D: Dispatcher> {
    dispatcher: D,
}

impl<D: Dispatcher> ActionClient<D> {
    pub fn new(dispatcher: D) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Send one request and return the resulting collection snapshot.
    pub async fn execute(
        &self,
        action: Action,
        collection: &str,
        id: Option<String>,
        data: Option<Record>,
        headers: Vec<String>,
    ) -> Result<Vec<Record>> {
        let request = ActionRequest {
            action,
            sheet_name: collection.to_string(),
            id,
            data,
            headers,
        };
        debug!(
            collection,
            %action,
            record_id = request.id.as_deref().unwrap_or("-"),
            "dispatching"
        );

        let body = self.dispatcher.send(&request).await.inspect_err(|err| {
            warn!(collection, %action, error = %err, "dispatch failed");
        })?;

        let records = normalize(&body).inspect_err(|err| {
            warn!(collection, %action, error = %err, "unusable reply");
        })?;
        debug!(collection, %action, count = records.len(), "snapshot received");
        Ok(records)
    }

    /// Fetch the `name` column of an option-source collection.
    pub async fn fetch_names(&self, source: &str) -> Result<Vec<String>> {
        let records = self
            .execute(Action::GetAll, source, None, None, vec!["name".to_string()])
            .await?;
        Ok(records
            .iter()
            .filter_map(|r| r.text("name"))
            .filter(|name| !name.trim().is_empty())
            .collect())
    }
}

/// Parse a reply body into a list of records.
pub fn normalize(body: &str) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| TabulaError::MalformedResponse(format!("invalid JSON: {}", e)))?;
    normalize_value(value, true)
}

fn normalize_value(value: Value, allow_nested_string: bool) -> Result<Vec<Record>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(object) => Ok(Record::from_object(object)),
                other => Err(TabulaError::MalformedResponse(format!(
                    "item {} is {}, expected an object",
                    i,
                    type_name(&other)
                ))),
            })
            .collect(),
        Value::Object(object) => Ok(normalize_object(object)),
        Value::String(inner) if allow_nested_string => {
            let value: Value = serde_json::from_str(&inner).map_err(|e| {
                TabulaError::MalformedResponse(format!("invalid JSON inside string reply: {}", e))
            })?;
            normalize_value(value, false)
        }
        other => Err(TabulaError::MalformedResponse(format!(
            "expected a collection, got {}",
            type_name(&other)
        ))),
    }
}

fn normalize_object(object: Map<String, Value>) -> Vec<Record> {
    if object.is_empty() {
        return Vec::new();
    }

    let is_keyed_collection =
        !object.contains_key("id") && object.values().all(Value::is_object);

    if !is_keyed_collection {
        return vec![Record::from_object(object)];
    }

    object
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Object(inner) => {
                let mut record = Record::from_object(inner);
                record.id.get_or_insert(key);
                Some(record)
            }
            _ => None,
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Apply a request to an in-memory collection, the way the remote store does.
///
/// Shared by the local dispatchers. `add` assigns a fresh UUID when the
/// payload has no id.
pub(crate) fn apply_request(records: &mut Vec<Record>, request: &ActionRequest) -> Result<()> {
    match request.action {
        Action::GetAll => Ok(()),
        Action::Add => {
            let mut record = request
                .data
                .clone()
                .ok_or_else(|| TabulaError::Dispatch("add without data".to_string()))?;
            if record.id.is_none() {
                record.id = Some(uuid::Uuid::new_v4().to_string());
            }
            records.push(record);
            Ok(())
        }
        Action::Update => {
            let id = request_id(request)?;
            let data = request
                .data
                .as_ref()
                .ok_or_else(|| TabulaError::Dispatch("update without data".to_string()))?;
            let existing = records
                .iter_mut()
                .find(|r| r.id.as_deref() == Some(id))
                .ok_or_else(|| TabulaError::RecordNotFound(id.to_string()))?;
            for (key, value) in &data.values {
                existing.values.insert(key.clone(), value.clone());
            }
            Ok(())
        }
        Action::Delete => {
            let id = request_id(request)?;
            let before = records.len();
            records.retain(|r| r.id.as_deref() != Some(id));
            if records.len() == before {
                return Err(TabulaError::RecordNotFound(id.to_string()));
            }
            Ok(())
        }
    }
}

fn request_id(request: &ActionRequest) -> Result<&str> {
    request
        .id
        .as_deref()
        .ok_or_else(|| TabulaError::Dispatch(format!("{} without id", request.action)))
}

/// Serialize a collection the way the remote store replies: only the
/// requested columns, plus the id.
pub(crate) fn snapshot_body(records: &[Record], headers: &[String]) -> Result<String> {
    let projected: Vec<Record> = records
        .iter()
        .map(|r| Record {
            id: r.id.clone(),
            values: r
                .values
                .iter()
                .filter(|(k, _)| headers.is_empty() || headers.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
        .collect();
    Ok(serde_json::to_string(&projected)?)
}
