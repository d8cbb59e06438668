//! Error types for the wire module.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while building, transmitting or decoding envelopes.
///
/// None of these abort the process: callers decide whether a failed call
/// should be retried later.
#[derive(Debug, Error)]
pub enum WireError {
    /// Missing or malformed connection parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// The remote endpoint answered with a fault.
    #[error("transport fault {code}: {message}")]
    TransportFault { code: i32, message: String },

    /// The remote endpoint returned nothing usable.
    #[error("empty response from service {service} at {target}")]
    Protocol { service: String, target: String },

    /// A payload decoded to nothing.
    #[error("payload decoded to an empty envelope")]
    EmptyPayload,

    /// Payload could not be encoded, encrypted or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] syncbridge_core::CoreError),

    /// The transport call did not complete in time.
    #[error("timeout after {after:?} calling service {service}")]
    Timeout { service: String, after: Duration },
}

impl WireError {
    /// True for failures of the remote side or the network, which may
    /// succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WireError::TransportFault { .. } | WireError::Protocol { .. } | WireError::Timeout { .. }
        )
    }
}

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;
