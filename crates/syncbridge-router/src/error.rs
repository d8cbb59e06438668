//! Error types for the router module.

use syncbridge_core::ValidationError;
use thiserror::Error;

/// Batch-level validation failures. Any of these aborts the whole batch
/// before a single task is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("input is not a structured container")]
    MalformedInput,

    #[error("output is not a structured container")]
    MalformedOutput,

    #[error("task list is empty")]
    NoTasks,

    #[error("invalid task record: {0}")]
    InvalidTask(#[from] ValidationError),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("invalid type name: {0}")]
    InvalidTypeName(String),
}

/// Failure reported by a host-provided handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for host-provided handlers.
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// Per-task failures. These fail one task and never the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown or disabled object type: {0}")]
    InvalidObjectType(String),

    #[error("unknown widget type: {0}")]
    UnknownWidget(String),

    #[error("local file access is not available")]
    NoLocalFiles,

    #[error("task {0} is disabled")]
    Disabled(String),

    #[error("self-test failed")]
    SelfTestFailed,

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl TaskError {
    /// Failures that are expected and should not be logged as errors.
    pub fn is_quiet(&self) -> bool {
        matches!(self, TaskError::UnknownWidget(_))
    }
}

/// Result type for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;
