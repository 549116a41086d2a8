//! JSON interop: building raw targets from documents and taking untracked
//! snapshots back out.

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use super::{RawKind, Target, TargetId, Value};
use crate::error::{ReactiveError, Result};

/// Largest integer that survives a round-trip through `f64`.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::from(s),
            JsonValue::Array(items) => Value::Target(sequence_from_json(items)),
            JsonValue::Object(fields) => Value::Target(record_from_json(fields)),
        }
    }
}

fn sequence_from_json(items: Vec<JsonValue>) -> Target {
    Target::sequence(items.into_iter().map(Value::from))
}

fn record_from_json(fields: JsonMap<String, JsonValue>) -> Target {
    Target::record(fields.into_iter().map(|(key, value)| (key, Value::from(value))))
}

impl Target {
    /// Build a raw target from a JSON object or array.
    pub fn from_json(json: JsonValue) -> Result<Target> {
        match json {
            JsonValue::Array(items) => Ok(sequence_from_json(items)),
            JsonValue::Object(fields) => Ok(record_from_json(fields)),
            JsonValue::Null => Err(ReactiveError::NotAggregate { found: "null" }),
            JsonValue::Bool(_) => Err(ReactiveError::NotAggregate { found: "boolean" }),
            JsonValue::Number(_) => Err(ReactiveError::NotAggregate { found: "number" }),
            JsonValue::String(_) => Err(ReactiveError::NotAggregate { found: "string" }),
        }
    }

    /// Parse JSON text into a raw target.
    pub fn from_json_str(text: &str) -> Result<Target> {
        Target::from_json(serde_json::from_str(text)?)
    }
}

impl Value {
    /// Snapshot this value as JSON without tracking anything.
    ///
    /// Handles are read through their raw target and references through
    /// their current value. Maps become arrays of `[key, value]` pairs and
    /// sets become arrays. Weak containers cannot be enumerated and are
    /// rejected, as is data that contains itself.
    pub fn to_json(&self) -> Result<JsonValue> {
        let mut path = Vec::new();
        snapshot(self, &mut path)
    }
}

fn snapshot(value: &Value, path: &mut Vec<TargetId>) -> Result<JsonValue> {
    match value {
        Value::Undefined | Value::Null => Ok(JsonValue::Null),
        Value::Bool(b) => Ok(JsonValue::Bool(*b)),
        Value::Number(n) => Ok(number(*n)),
        Value::Str(s) => Ok(JsonValue::String(s.to_string())),
        Value::Ref(r) => snapshot(&r.peek(), path),
        Value::Target(_) | Value::Handle(_) => match value.raw_target() {
            Some(target) => snapshot_target(&target, path),
            None => Ok(JsonValue::Null),
        },
    }
}

fn snapshot_target(target: &Target, path: &mut Vec<TargetId>) -> Result<JsonValue> {
    let id = target.id();
    if path.contains(&id) {
        return Err(ReactiveError::CyclicValue);
    }
    path.push(id);

    let json = match target.kind() {
        RawKind::Record => {
            let mut fields = JsonMap::new();
            for (key, value) in target.entries() {
                fields.insert(key.to_string(), snapshot(&value, path)?);
            }
            JsonValue::Object(fields)
        }
        RawKind::Sequence | RawKind::Set => JsonValue::Array(
            target
                .entries()
                .iter()
                .map(|(_, value)| snapshot(value, path))
                .collect::<Result<_>>()?,
        ),
        RawKind::Map => JsonValue::Array(
            target
                .entries()
                .iter()
                .map(|(key, value)| {
                    Ok(JsonValue::Array(vec![
                        snapshot(key, path)?,
                        snapshot(value, path)?,
                    ]))
                })
                .collect::<Result<_>>()?,
        ),
        kind => {
            return Err(ReactiveError::UnsupportedOperation {
                op: "to_json",
                kind,
            })
        }
    };

    path.pop();
    Ok(json)
}

fn number(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        JsonValue::Number(JsonNumber::from(n as i64))
    } else {
        JsonNumber::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}
