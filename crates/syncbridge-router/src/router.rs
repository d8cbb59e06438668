//! Task router: runs an inbound batch against local handlers.
//!
//! ```text
//! Idle ─▶ Validating ─▶ Dispatching(task 1..n) ─▶ Aggregating ─▶ Done
//!              │
//!              └─ invalid input: whole batch rejected, nothing dispatched
//! ```
//!
//! Tasks run strictly in order. A failing task yields a failed result and
//! never stops the batch.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use syncbridge_core::{BatchStats, Task, TaskResult, Value};
use syncbridge_wire::Logger;

use crate::error::{Result, RouterError, TaskError};
use crate::handlers;
use crate::locks::ObjectLocks;
use crate::registry::{HostIntegration, Registry};

/// Handler group selected by the service name of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerGroup {
    Admin,
    Objects,
    Files,
    Widgets,
}

impl HandlerGroup {
    pub fn from_service(service: &str) -> Option<Self> {
        match service {
            "admin" => Some(HandlerGroup::Admin),
            "objects" => Some(HandlerGroup::Objects),
            "files" => Some(HandlerGroup::Files),
            "widgets" => Some(HandlerGroup::Widgets),
            _ => None,
        }
    }

    pub const fn service(self) -> &'static str {
        match self {
            HandlerGroup::Admin => "admin",
            HandlerGroup::Objects => "objects",
            HandlerGroup::Files => "files",
            HandlerGroup::Widgets => "widgets",
        }
    }
}

impl fmt::Display for HandlerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service())
    }
}

/// A batch that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch {
    pub group: HandlerGroup,
    pub tasks: Vec<Task>,
}

/// Dispatches task batches to handler groups.
pub struct Router {
    registry: Arc<Registry>,
    host: Arc<dyn HostIntegration>,
    locks: Arc<ObjectLocks>,
    logger: Arc<Logger>,
}

impl Router {
    pub fn new(
        registry: Arc<Registry>,
        host: Arc<dyn HostIntegration>,
        locks: Arc<ObjectLocks>,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            registry,
            host,
            locks,
            logger,
        }
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn host(&self) -> &dyn HostIntegration {
        self.host.as_ref()
    }

    pub(crate) fn locks(&self) -> &Arc<ObjectLocks> {
        &self.locks
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Check a batch before dispatch.
    ///
    /// Both buffers must be maps (the output may also be still empty), the
    /// task list must be non-empty with well-formed records, and the service
    /// must name a handler group.
    pub fn validate(&self, service: &str, input: &Value, output: &Value) -> Result<ValidatedBatch> {
        let result = Self::check(service, input, output);
        if let Err(e) = &result {
            self.logger
                .error(format!("Rejected {} batch: {}", service, e));
        }
        result
    }

    fn check(service: &str, input: &Value, output: &Value) -> Result<ValidatedBatch> {
        if input.as_map().is_none() {
            return Err(RouterError::MalformedInput);
        }
        if !matches!(output, Value::Null | Value::Map(_)) {
            return Err(RouterError::MalformedOutput);
        }

        let records: Vec<&Value> = match input.get("tasks") {
            Some(Value::List(items)) => items.iter().collect(),
            Some(Value::Map(map)) => map.values().collect(),
            _ => Vec::new(),
        };
        if records.is_empty() {
            return Err(RouterError::NoTasks);
        }
        let tasks = records
            .into_iter()
            .map(Task::from_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let group = HandlerGroup::from_service(service)
            .ok_or_else(|| RouterError::UnknownService(service.to_string()))?;

        Ok(ValidatedBatch { group, tasks })
    }

    /// Run every task of a batch and fill `output` with `tasks`,
    /// `tasksinfos` and `result`.
    ///
    /// Returns true iff every task succeeded. A batch that fails validation
    /// dispatches nothing and returns false.
    pub async fn execute(&self, service: &str, input: &Value, output: &mut Value) -> bool {
        let batch = match self.validate(service, input, output) {
            Ok(batch) => batch,
            Err(_) => return false,
        };

        let started = Instant::now();
        let mut stats = BatchStats::default();
        let mut results = Vec::with_capacity(batch.tasks.len());

        for task in &batch.tasks {
            let task_started = Instant::now();
            stats.performed += 1;

            let mut result = match self.dispatch(batch.group, task).await {
                Ok(data) => TaskResult::succeeded(task, data),
                Err(e) => {
                    if e.is_quiet() {
                        self.logger
                            .debug(format!("{}/{}: {}", batch.group, task.name, e));
                    } else {
                        self.logger
                            .error(format!("{}/{}: {}", batch.group, task.name, e));
                    }
                    TaskResult::failed(task)
                }
            };
            result.elapsed_ms = elapsed_ms(task_started);
            if result.result {
                stats.ok += 1;
            }
            results.push(result);
        }

        stats.elapsed_ms = elapsed_ms(started);
        let success = stats.performed == stats.ok;
        tracing::debug!(
            service,
            performed = stats.performed,
            ok = stats.ok,
            "batch executed"
        );

        output.insert(
            "tasks",
            Value::List(results.iter().map(TaskResult::to_value).collect()),
        );
        output.insert("tasksinfos", stats.to_value());
        output.insert("result", success);
        success
    }

    async fn dispatch(&self, group: HandlerGroup, task: &Task) -> std::result::Result<Value, TaskError> {
        match group {
            HandlerGroup::Admin => handlers::admin::dispatch(self, task).await,
            HandlerGroup::Objects => handlers::objects::dispatch(self, task).await,
            HandlerGroup::Files => handlers::files::dispatch(self, task).await,
            HandlerGroup::Widgets => handlers::widgets::dispatch(self, task).await,
        }
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
