//! Error types for the connector session.

use syncbridge_core::{Fingerprint, ValidationError};
use syncbridge_router::RouterError;
use syncbridge_store::StoreError;
use syncbridge_wire::WireError;
use thiserror::Error;

/// Errors that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Configuration, transport or protocol error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Waiting queue storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Batch rejected before dispatch.
    #[error("router error: {0}")]
    Router(#[from] RouterError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The server did not accept a commit. Recoverable: the event is retried.
    #[error("commit delivery failed: {0}")]
    CommitDelivery(String),

    /// An event failed too often and was dropped.
    #[error("commit {0} is obsolete")]
    CommitObsolete(Fingerprint),

    /// Missing builder input or misuse of the session.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;
