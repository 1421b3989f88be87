use super::error::{DbError, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

/// Identity of an entity inside one array-shaped collection.
pub type EntityId = u64;

/// A stored entity: a JSON object with an `id` plus caller-owned fields.
pub type Record = serde_json::Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const PROTECTED_FIELD: &str = "protected";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

pub fn record_id(record: &Record) -> Option<EntityId> {
    record.get(ID_FIELD).and_then(Value::as_u64)
}

pub fn is_protected(record: &Record) -> bool {
    record
        .get(PROTECTED_FIELD)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// `max(existing ids) + 1`, or `1` when nothing carries a numeric id.
pub fn next_id(items: &[Value]) -> EntityId {
    items
        .iter()
        .filter_map(|item| item.get(ID_FIELD).and_then(Value::as_u64))
        .max()
        .map_or(1, |max| max + 1)
}

pub fn validate_entity_id(id: EntityId, kind: &str) -> Result<EntityId> {
    if id == 0 {
        return Err(DbError::Validation(format!("Invalid {} ID format", kind)));
    }
    Ok(id)
}

/// Parses an id coming from outside (path segment, CLI argument).
pub fn parse_entity_id(raw: &str, kind: &str) -> Result<EntityId> {
    raw.trim()
        .parse::<EntityId>()
        .map_err(|_| DbError::Validation(format!("Invalid {} ID format", kind)))
        .and_then(|id| validate_entity_id(id, kind))
}

/// Converts a JSON value into a record, rejecting non-objects.
pub fn into_record(value: Value) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DbError::Validation(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Returns `patch` with `updatedAt` set to the current time.
pub fn touch_updated_at(mut patch: Record) -> Record {
    patch.insert(UPDATED_AT_FIELD.to_string(), Value::String(now_timestamp()));
    patch
}

/// Shallow merge: every key of `patch` overwrites the same key of `base`.
pub fn merge_records(mut base: Record, patch: &Record) -> Record {
    for (key, value) in patch {
        base.insert(key.clone(), value.clone());
    }
    base
}
