//! Error types for the SyncBridge core.

use thiserror::Error;

/// Core errors raised while encoding, decoding or encrypting payloads.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("unknown cipher: {0}")]
    UnknownCipher(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Validation errors for task records and task parameters.
///
/// These are reported per task and never abort a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing parameter: {0}")]
    MissingParam(&'static str),

    #[error("invalid parameter {param}: {reason}")]
    InvalidParam { param: &'static str, reason: String },

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("requested field list is empty")]
    EmptyFieldList,

    #[error("malformed task record: {0}")]
    MalformedTask(String),

    #[error("unknown commit action: {0}")]
    UnknownAction(String),
}
