//! Wire envelopes.
//!
//! Outbound request:
//!
//! ```text
//! {server: descriptor, service, debug: 0|1, tasks: [{id, name, desc, params}], taskscount}
//! ```
//!
//! Inbound response:
//!
//! ```text
//! {result, tasks: [{id, name, desc, result, data, delayms, delaystr}],
//!  tasksinfos: {DelayMs, DelayStr, Performed, Ok}, log?}
//! ```

use syncbridge_core::{BatchStats, Task, TaskResult, Value, ValidationError};

use crate::log::LogBlock;

/// Current protocol version.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Envelope size limits.
pub mod limits {
    /// Max tasks in one batch.
    pub const MAX_TASKS_PER_BATCH: usize = 1000;
}

/// Self-description of the sending side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub runtime_name: String,
    pub runtime_version: String,
    pub protocol_version: String,
    /// Connector identifier.
    pub identifier: String,
    /// Endpoint the sender reaches the server through.
    pub host: String,
}

impl ServerDescriptor {
    /// Descriptor of this runtime for the given connector identity.
    pub fn local(identifier: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            runtime_name: env!("CARGO_PKG_NAME").to_string(),
            runtime_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            identifier: identifier.into(),
            host: host.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::from_pairs([
            ("ServerType", self.runtime_name.as_str()),
            ("ServerVersion", self.runtime_version.as_str()),
            ("ProtocolVersion", self.protocol_version.as_str()),
            ("WsIdentifier", self.identifier.as_str()),
            ("ServerHost", self.host.as_str()),
        ])
    }

    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::scalar_text)
                .unwrap_or_default()
        };
        Self {
            runtime_name: text("ServerType"),
            runtime_version: text("ServerVersion"),
            protocol_version: text("ProtocolVersion"),
            identifier: text("WsIdentifier"),
            host: text("ServerHost"),
        }
    }
}

/// Outbound task batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub server: ServerDescriptor,
    pub service: String,
    pub debug: bool,
    pub tasks: Vec<Task>,
}

impl Request {
    pub fn to_value(&self) -> Value {
        Value::from_pairs([
            ("server", self.server.to_value()),
            ("service", Value::from(self.service.as_str())),
            ("debug", Value::from(i64::from(self.debug))),
            ("tasks", Value::List(self.tasks.iter().map(Task::to_value).collect())),
            ("taskscount", Value::from(self.tasks.len() as i64)),
        ])
    }

    /// Parse a request envelope. Every task record must be well formed.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        if value.as_map().is_none() {
            return Err(ValidationError::MalformedTask("envelope is not a map".into()));
        }
        let tasks = entries(value.get("tasks"))
            .into_iter()
            .map(Task::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            server: value
                .get("server")
                .map(ServerDescriptor::from_value)
                .unwrap_or_else(|| ServerDescriptor::from_value(&Value::Null)),
            service: value
                .get("service")
                .and_then(Value::scalar_text)
                .unwrap_or_default(),
            debug: value.get("debug").and_then(Value::as_bool).unwrap_or(false),
            tasks,
        })
    }
}

/// Decoded result of a task batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response {
    /// True iff every task succeeded.
    pub result: bool,
    pub tasks: Vec<TaskResult>,
    pub stats: Option<BatchStats>,
    pub log: Option<LogBlock>,
}

impl Response {
    /// Result of the task with the given id.
    pub fn task(&self, id: u32) -> Option<&TaskResult> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn to_value(&self) -> Value {
        let mut value = Value::from_pairs([
            ("result", Value::from(self.result)),
            (
                "tasks",
                Value::List(self.tasks.iter().map(TaskResult::to_value).collect()),
            ),
        ]);
        if let Some(stats) = &self.stats {
            value.insert("tasksinfos", stats.to_value());
        }
        if let Some(log) = self.log.as_ref().filter(|log| !log.is_empty()) {
            value.insert("log", log.to_value());
        }
        value
    }

    /// Parse a response envelope. Unreadable task results are skipped.
    pub fn from_value(value: &Value) -> Self {
        let tasks = entries(value.get("tasks"))
            .into_iter()
            .filter_map(|t| match TaskResult::from_value(t) {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::warn!("skipping task result: {}", e);
                    None
                }
            })
            .collect();

        Self {
            result: value.get("result").and_then(Value::as_bool).unwrap_or(false),
            tasks,
            stats: value.get("tasksinfos").and_then(BatchStats::from_value),
            log: value.get("log").map(LogBlock::from_value),
        }
    }
}

/// Items of a task collection: a list, or a map keyed by position.
fn entries(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::List(items)) => items.iter().collect(),
        Some(Value::Map(map)) => map.values().collect(),
        _ => Vec::new(),
    }
}
