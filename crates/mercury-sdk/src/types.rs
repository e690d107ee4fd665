// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Records exchanged with the Mercury service.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Result, SdkError};

/// Field the service uses to identify a device.
pub const DEVICE_ID_FIELD: &str = "mercury_id";

/// Structured device filter, sent verbatim to the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Map<String, Value>);

impl Query {
    /// Create an empty query (matches every device).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a query from decoded JSON. Anything but an object is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SdkError::Validation(format!(
                "query must be a mapping, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse a query from JSON or YAML text.
    pub fn parse(text: &str) -> Result<Self> {
        let value = match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(json_err) => serde_yaml::from_str::<Value>(text).map_err(|yaml_err| {
                SdkError::Validation(format!(
                    "query is neither valid JSON ({}) nor YAML ({})",
                    json_err, yaml_err
                ))
            })?,
        };
        Self::from_value(value)
    }

    /// Add or replace a predicate.
    pub fn insert(&mut self, field: impl Into<String>, predicate: Value) {
        self.0.insert(field.into(), predicate);
    }

    /// Borrow the predicates.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// What a job or press operates on.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetDescriptor {
    /// A single device, by identifier.
    Device(String),
    /// Every device matching a query.
    Query(Query),
}

impl TargetDescriptor {
    /// Target a single device.
    pub fn device(id: impl Into<String>) -> Self {
        TargetDescriptor::Device(id.into().trim().to_string())
    }

    /// Whether this descriptor names exactly one device.
    pub fn is_single(&self) -> bool {
        matches!(self, TargetDescriptor::Device(_))
    }

    /// The device identifier in single-target mode.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            TargetDescriptor::Device(id) => Some(id),
            TargetDescriptor::Query(_) => None,
        }
    }

    /// The query the service resolves for this descriptor.
    pub fn to_query(&self) -> Query {
        match self {
            TargetDescriptor::Device(id) => {
                let mut query = Query::new();
                query.insert(DEVICE_ID_FIELD, Value::String(id.clone()));
                query
            }
            TargetDescriptor::Query(query) => query.clone(),
        }
    }
}

impl Serialize for TargetDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_query().serialize(serializer)
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetDescriptor::Device(id) => write!(f, "{}", id),
            TargetDescriptor::Query(query) => write!(f, "{}", Value::Object(query.0.clone())),
        }
    }
}

/// The remote call a job performs on every target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// RPC method name.
    pub method: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

/// Successful job creation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Server-assigned job identifier.
    pub job_id: String,
    /// Resolved targets as reported by the service.
    #[serde(default)]
    pub targets: Value,
}

/// Job status as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Job identifier, when echoed by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Completion timestamp; `None` while the job is running.
    #[serde(default)]
    pub time_completed: Option<Value>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatusRecord {
    /// Whether the service has marked the job complete.
    pub fn is_complete(&self) -> bool {
        self.time_completed.is_some()
    }
}

/// Per-device result of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mercury_id: Option<String>,
    /// Completion timestamp; `None` while the task is running.
    #[serde(default)]
    pub time_completed: Option<Value>,
    /// Result payload.
    #[serde(default)]
    pub message: Value,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    /// Identifier of the device this task ran on.
    pub fn device_id(&self) -> &str {
        self.device_id
            .as_deref()
            .or(self.mercury_id.as_deref())
            .unwrap_or_default()
    }

    /// Whether the task has finished.
    pub fn is_complete(&self) -> bool {
        self.time_completed.is_some()
    }

    /// Captured stdout, if non-empty.
    pub fn stdout(&self) -> Option<&str> {
        self.message_str("stdout")
    }

    /// Captured stderr, if non-empty.
    pub fn stderr(&self) -> Option<&str> {
        self.message_str("stderr")
    }

    fn message_str(&self, field: &str) -> Option<&str> {
        self.message
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Decode the tasks endpoint, which answers with either a bare list or
/// `{"tasks": [...]}`.
pub(crate) fn decode_tasks(value: Value) -> Result<Vec<Task>> {
    let list = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => match map.remove("tasks") {
            Some(list @ Value::Array(_)) => list,
            _ => {
                return Err(SdkError::UnexpectedResponse(
                    "tasks response has no task list".to_string(),
                ));
            }
        },
        other => {
            return Err(SdkError::UnexpectedResponse(format!(
                "expected task list, got {}",
                json_kind(&other)
            )));
        }
    };

    serde_json::from_value(list)
        .map_err(|e| SdkError::UnexpectedResponse(format!("invalid task record: {}", e)))
}

/// One page of inventory query results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryPage {
    /// Device records, shaped by the requested projection.
    #[serde(default)]
    pub items: Vec<Value>,
    /// Remaining fields (totals, limits).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InventoryPage {
    /// Device identifiers present in the page.
    pub fn device_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|item| item.get(DEVICE_ID_FIELD).and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    /// Whether the page has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_rejects_non_mapping() {
        assert!(matches!(
            Query::from_value(json!([1, 2])),
            Err(SdkError::Validation(_))
        ));
        assert!(matches!(Query::parse("42"), Err(SdkError::Validation(_))));
    }

    #[test]
    fn test_query_parses_yaml() {
        let query = Query::parse("rack: r12\nactive: true\n").unwrap();
        assert_eq!(query.as_map()["rack"], "r12");
        assert_eq!(query.as_map()["active"], true);
    }

    #[test]
    fn test_device_target_wire_form() {
        let target = TargetDescriptor::device(" abc123 ");
        assert!(target.is_single());
        assert_eq!(target.device_id(), Some("abc123"));
        assert_eq!(
            serde_json::to_value(&target).unwrap(),
            json!({"mercury_id": "abc123"})
        );
    }

    #[test]
    fn test_decode_tasks_accepts_both_shapes() {
        let bare = json!([{"mercury_id": "a", "message": {"stdout": "hi", "stderr": ""}}]);
        let wrapped = json!({"tasks": [{"device_id": "b", "message": null}]});

        let tasks = decode_tasks(bare).unwrap();
        assert_eq!(tasks[0].device_id(), "a");
        assert_eq!(tasks[0].stdout(), Some("hi"));
        assert_eq!(tasks[0].stderr(), None);

        let tasks = decode_tasks(wrapped).unwrap();
        assert_eq!(tasks[0].device_id(), "b");
        assert_eq!(tasks[0].stdout(), None);
    }

    #[test]
    fn test_decode_tasks_rejects_other_shapes() {
        assert!(matches!(
            decode_tasks(json!({"items": []})),
            Err(SdkError::UnexpectedResponse(_))
        ));
        assert!(matches!(
            decode_tasks(json!("nope")),
            Err(SdkError::UnexpectedResponse(_))
        ));
    }
}
