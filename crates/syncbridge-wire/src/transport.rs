//! Transport abstraction.
//!
//! The transport carries one fully framed, encrypted envelope to the server
//! and returns the packed response. HTTP, SOAP or any other carrier is an
//! implementation detail of the host.

use std::fmt;

use async_trait::async_trait;

/// A fault reported by the remote endpoint or the carrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFault {
    pub code: i32,
    pub message: String,
}

impl TransportFault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault {}: {}", self.code, self.message)
    }
}

/// Transport trait for delivering packed envelopes.
///
/// Implementations must be thread-safe (Send + Sync). There is no retry at
/// this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `payload` to `service` and return the packed response.
    async fn invoke(&self, service: &str, payload: &str) -> Result<String, TransportFault>;

    /// Description of the remote endpoint, for error reports.
    fn target(&self) -> String;
}

/// An in-memory transport for testing.
///
/// Every call is recorded and answered by a responder closure.
pub mod memory {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Responder = dyn Fn(&str, &str) -> Result<String, TransportFault> + Send + Sync;

    /// One recorded call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedCall {
        pub service: String,
        pub payload: String,
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        target: String,
        responder: Arc<Responder>,
        delay: Option<Duration>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl MemoryTransport {
        /// Answer every call with `responder(service, payload)`.
        pub fn new<F>(responder: F) -> Self
        where
            F: Fn(&str, &str) -> Result<String, TransportFault> + Send + Sync + 'static,
        {
            Self {
                target: "memory://sync-server".into(),
                responder: Arc::new(responder),
                delay: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Fail every call with the given fault.
        pub fn failing(code: i32, message: impl Into<String>) -> Self {
            let fault = TransportFault::new(code, message);
            Self::new(move |_, _| Err(fault.clone()))
        }

        /// Sleep before answering each call.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn with_target(mut self, target: impl Into<String>) -> Self {
            self.target = target.into();
            self
        }

        /// Every call received so far.
        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn invoke(&self, service: &str, payload: &str) -> Result<String, TransportFault> {
            self.calls.lock().unwrap().push(RecordedCall {
                service: service.to_string(),
                payload: payload.to_string(),
            });
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (self.responder)(service, payload)
        }

        fn target(&self) -> String {
            self.target.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryTransport;
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_records_calls() {
        let transport = MemoryTransport::new(|service, payload| Ok(format!("{}:{}", service, payload)));
        let answer = transport.invoke("objects", "abc").await.unwrap();
        assert_eq!(answer, "objects:abc");

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].service, "objects");
        assert_eq!(calls[0].payload, "abc");
    }

    #[tokio::test]
    async fn test_failing_transport() {
        let transport = MemoryTransport::failing(503, "unavailable");
        let fault = transport.invoke("objects", "abc").await.unwrap_err();
        assert_eq!(fault, TransportFault::new(503, "unavailable"));
        assert_eq!(transport.call_count(), 1);
    }
}
