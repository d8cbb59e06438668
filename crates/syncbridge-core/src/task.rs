//! Task records: one named operation carried inside a batch.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::value::{Map, Value};

/// One named operation with parameters.
///
/// Ids are sequence numbers unique within a batch and assigned when the
/// task is attached to an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Sequence number within the batch.
    pub id: u32,
    /// Operation identifier, dispatched on by the handler group.
    pub name: String,
    /// Free-form description for logs.
    pub description: String,
    /// Operation parameters, shaped by the handler.
    pub params: Value,
}

impl Task {
    /// Create a task that has not been attached to a batch yet.
    pub fn new(name: impl Into<String>, description: impl Into<String>, params: Value) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: description.into(),
            params,
        }
    }

    /// Wire form: `{id, name, desc, params}`.
    pub fn to_value(&self) -> Value {
        Value::from_pairs([
            ("id", Value::from(self.id)),
            ("name", Value::from(self.name.as_str())),
            ("desc", Value::from(self.description.as_str())),
            ("params", self.params.clone()),
        ])
    }

    /// Parse a wire task record.
    ///
    /// A record must be a map with a non-empty `name`; a missing id is read
    /// as 0, a missing description as empty text.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let map = value
            .as_map()
            .ok_or_else(|| ValidationError::MalformedTask("task is not a map".into()))?;

        let name = map
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ValidationError::MalformedTask("task has no name".into()))?;

        let id = match map.get("id") {
            None | Some(Value::Null) => 0,
            Some(raw) => raw
                .as_i64()
                .and_then(|id| u32::try_from(id).ok())
                .ok_or_else(|| ValidationError::MalformedTask(format!("invalid task id {:?}", raw)))?,
        };

        Ok(Self {
            id,
            name: name.to_string(),
            description: map
                .get("desc")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            params: map.get("params").cloned().unwrap_or_default(),
        })
    }
}

/// Outcome of one dispatched task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: u32,
    pub name: String,
    pub description: String,
    /// Success flag. Independent of the shape of `data`.
    pub result: bool,
    /// Handler output; `Null` on failure.
    pub data: Value,
    /// Handler execution time.
    pub elapsed_ms: f64,
}

impl TaskResult {
    /// A failed result for `task` with no data.
    pub fn failed(task: &Task) -> Self {
        Self {
            id: task.id,
            name: task.name.clone(),
            description: task.description.clone(),
            result: false,
            data: Value::Null,
            elapsed_ms: 0.0,
        }
    }

    /// A successful result for `task` carrying `data`.
    pub fn succeeded(task: &Task, data: Value) -> Self {
        Self {
            result: true,
            data,
            ..Self::failed(task)
        }
    }

    /// Wire form: `{id, name, desc, result, data, delayms, delaystr}`.
    pub fn to_value(&self) -> Value {
        Value::from_pairs([
            ("id", Value::from(self.id)),
            ("name", Value::from(self.name.as_str())),
            ("desc", Value::from(self.description.as_str())),
            ("result", Value::from(self.result)),
            ("data", self.data.clone()),
            ("delayms", Value::from(self.elapsed_ms)),
            ("delaystr", Value::from(format_delay(self.elapsed_ms))),
        ])
    }

    /// Parse a wire result record. Missing fields fall back to failure defaults.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let map = value
            .as_map()
            .ok_or_else(|| ValidationError::MalformedTask("task result is not a map".into()))?;
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self {
            id: map
                .get("id")
                .and_then(Value::as_i64)
                .and_then(|id| u32::try_from(id).ok())
                .unwrap_or_default(),
            name: text("name"),
            description: text("desc"),
            result: map.get("result").and_then(Value::as_bool).unwrap_or(false),
            data: map.get("data").cloned().unwrap_or_default(),
            elapsed_ms: map.get("delayms").and_then(Value::as_f64).unwrap_or_default(),
        })
    }
}

/// Aggregate statistics of one executed batch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub elapsed_ms: f64,
    /// Tasks attempted.
    pub performed: u32,
    /// Tasks that succeeded.
    pub ok: u32,
}

impl BatchStats {
    /// Wire form: `{DelayMs, DelayStr, Performed, Ok}`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("DelayMs".into(), Value::from(self.elapsed_ms));
        map.insert("DelayStr".into(), Value::from(format_delay(self.elapsed_ms)));
        map.insert("Performed".into(), Value::from(self.performed));
        map.insert("Ok".into(), Value::from(self.ok));
        Value::Map(map)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let count = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_i64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or_default()
        };
        value.as_map()?;
        Some(Self {
            elapsed_ms: value.get("DelayMs").and_then(Value::as_f64).unwrap_or_default(),
            performed: count("Performed"),
            ok: count("Ok"),
        })
    }
}

fn format_delay(elapsed_ms: f64) -> String {
    format!("{:.3} ms", elapsed_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_wire_roundtrip() {
        let mut task = Task::new("get", "Read object", Value::from_pairs([("type", "Product")]));
        task.id = 3;
        let parsed = Task::from_value(&task.to_value()).unwrap();
        assert_eq!(parsed, task);
    }

    #[test]
    fn test_task_requires_name() {
        let record = Value::from_pairs([("id", 1)]);
        assert!(matches!(
            Task::from_value(&record),
            Err(ValidationError::MalformedTask(_))
        ));
        assert!(Task::from_value(&Value::from("get")).is_err());
    }

    #[test]
    fn test_task_id_accepts_wire_text() {
        let record = Value::from_pairs([("id", "12"), ("name", "list")]);
        assert_eq!(Task::from_value(&record).unwrap().id, 12);

        let negative = Value::from_pairs([("id", Value::from(-1)), ("name", Value::from("list"))]);
        assert!(Task::from_value(&negative).is_err());
    }

    #[test]
    fn test_empty_data_is_still_success() {
        let task = Task::new("list", "", Value::Null);
        let result = TaskResult::succeeded(&task, Value::List(vec![]));
        assert!(result.result);

        let parsed = TaskResult::from_value(&result.to_value()).unwrap();
        assert!(parsed.result);
        assert_eq!(parsed.data, Value::List(vec![]));
    }

    #[test]
    fn test_batch_stats_wire_names() {
        let stats = BatchStats {
            elapsed_ms: 1.5,
            performed: 3,
            ok: 2,
        };
        let value = stats.to_value();
        assert_eq!(value.get("Performed"), Some(&Value::from(3u32)));
        assert_eq!(value.get("DelayStr"), Some(&Value::from("1.500 ms")));
        assert_eq!(BatchStats::from_value(&value), Some(stats));
    }
}
