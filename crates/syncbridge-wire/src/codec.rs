//! Envelope codec and call lifecycle.
//!
//! ```text
//! value ──serialize──▶ bytes ──encrypt──▶ base64 ──Transport──▶ base64 ──decrypt──▶ bytes ──decode──▶ value
//!        (XML tree                (AES-CBC, or plain
//!         or JSON)                 base64 when uncrypted)
//! ```
//!
//! Every transmitting operation verifies the connection parameters first.
//! Failures are returned, never raised, so a caller can queue a failed
//! commit for a later attempt.

use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use syncbridge_core::{tree, CipherMaterial, CoreError, Task, Value};

use crate::config::{ConnectorConfig, Encoding};
use crate::error::{Result, WireError};
use crate::log::Logger;
use crate::messages::{limits, Request, Response, ServerDescriptor};
use crate::transport::Transport;

/// Handshake service answered without encryption.
pub const PING_SERVICE: &str = "ping";

/// Handshake service checking the shared key.
pub const CONNECT_SERVICE: &str = "connect";

/// Wire codec bound to one connector configuration and transport.
pub struct Codec {
    config: ConnectorConfig,
    transport: Arc<dyn Transport>,
    logger: Arc<Logger>,
    /// Tasks queued for the next call.
    outbound: Mutex<Vec<Task>>,
    /// Decoded response of the last call.
    inbound: Mutex<Option<Response>>,
}

impl Codec {
    pub fn new(config: ConnectorConfig, transport: Arc<dyn Transport>, logger: Arc<Logger>) -> Self {
        Self {
            config,
            transport,
            logger,
            outbound: Mutex::new(Vec::new()),
            inbound: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Fail unless host, identifier and key are all set.
    pub fn verify(&self) -> Result<()> {
        self.config.verify()
    }

    /// Descriptor sent with every request.
    pub fn descriptor(&self) -> ServerDescriptor {
        ServerDescriptor::local(&self.config.identifier, &self.config.host)
    }

    fn material(&self) -> CipherMaterial {
        CipherMaterial::derive(
            self.config.cipher,
            &self.config.encryption_key,
            &self.config.identifier,
        )
    }

    fn serialize(&self, value: &Value) -> Result<Vec<u8>> {
        match self.config.encoding {
            Encoding::Xml => Ok(tree::encode(value)?.into_bytes()),
            Encoding::Native => {
                serde_json::to_vec(value).map_err(|e| CoreError::Encoding(e.to_string()).into())
            }
        }
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value> {
        match self.config.encoding {
            Encoding::Xml => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| CoreError::Decoding(format!("envelope is not UTF-8: {}", e)))?;
                Ok(tree::decode(text)?)
            }
            Encoding::Native => {
                serde_json::from_slice(bytes).map_err(|e| CoreError::Decoding(e.to_string()).into())
            }
        }
    }

    /// Serialize `value`, then encrypt it, or only base64 it when `uncrypted`.
    pub fn pack(&self, value: &Value, uncrypted: bool) -> Result<String> {
        let bytes = self.serialize(value)?;
        if uncrypted {
            Ok(STANDARD.encode(bytes))
        } else {
            Ok(self.material().encrypt(&bytes)?)
        }
    }

    /// Inverse of [`pack`](Self::pack). Fails if the payload decodes to nothing.
    pub fn unpack(&self, payload: &str, uncrypted: bool) -> Result<Value> {
        let bytes = if uncrypted {
            STANDARD.decode(payload.trim()).map_err(CoreError::from)?
        } else {
            self.material().decrypt(payload)?
        };
        if bytes.is_empty() {
            return Err(WireError::EmptyPayload);
        }
        let value = self.deserialize(&bytes)?;
        match &value {
            Value::Null => Err(WireError::EmptyPayload),
            Value::Map(map) if map.is_empty() => Err(WireError::EmptyPayload),
            _ => Ok(value),
        }
    }

    /// Queue a task for the next call. Returns the number of queued tasks.
    pub fn add_task(&self, name: &str, description: &str, params: Value) -> usize {
        let mut outbound = self.outbound.lock().unwrap();
        outbound.push(Task::new(name, description, params));
        outbound.len()
    }

    pub fn pending_tasks(&self) -> usize {
        self.outbound.lock().unwrap().len()
    }

    /// Drop queued tasks and the last response.
    pub fn clear(&self) {
        self.outbound.lock().unwrap().clear();
        *self.inbound.lock().unwrap() = None;
    }

    /// Decoded response of the last successful call.
    pub fn last_response(&self) -> Option<Response> {
        self.inbound.lock().unwrap().clone()
    }

    /// Send queued tasks plus `extra_tasks` to `service` and decode the answer.
    ///
    /// Tasks are numbered from 1 in send order. Queued tasks are kept when
    /// the call fails, and dropped after a successful call if `clear_after`.
    pub async fn call(
        &self,
        service: &str,
        extra_tasks: Vec<Task>,
        uncrypted: bool,
        clear_after: bool,
    ) -> Result<Response> {
        self.verify()?;
        *self.inbound.lock().unwrap() = None;

        let mut tasks = self.outbound.lock().unwrap().clone();
        tasks.extend(extra_tasks);
        if tasks.len() > limits::MAX_TASKS_PER_BATCH {
            return Err(CoreError::Encoding(format!(
                "batch of {} tasks exceeds limit of {}",
                tasks.len(),
                limits::MAX_TASKS_PER_BATCH
            ))
            .into());
        }
        for (task, id) in tasks.iter_mut().zip(1u32..) {
            task.id = id;
        }

        let request = Request {
            server: self.descriptor(),
            service: service.to_string(),
            debug: self.config.debug,
            tasks,
        };
        let payload = self.pack(&request.to_value(), uncrypted)?;
        tracing::debug!(service, tasks = request.tasks.len(), "calling server");

        let answer = match tokio::time::timeout(
            self.config.timeout,
            self.transport.invoke(service, &payload),
        )
        .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(fault)) => {
                self.logger
                    .error(format!("Service {} failed: {}", service, fault));
                return Err(WireError::TransportFault {
                    code: fault.code,
                    message: fault.message,
                });
            }
            Err(_) => {
                self.logger.error(format!(
                    "Service {} timed out after {:?}",
                    service, self.config.timeout
                ));
                return Err(WireError::Timeout {
                    service: service.to_string(),
                    after: self.config.timeout,
                });
            }
        };

        let protocol_error = || WireError::Protocol {
            service: service.to_string(),
            target: self.transport.target(),
        };
        if answer.trim().is_empty() {
            self.logger
                .error(format!("Service {} returned an empty response", service));
            return Err(protocol_error());
        }
        let value = match self.unpack(&answer, uncrypted) {
            Ok(value) => value,
            Err(WireError::EmptyPayload) => return Err(protocol_error()),
            Err(e) => {
                self.logger
                    .error(format!("Service {} response is unreadable: {}", service, e));
                return Err(e);
            }
        };

        let response = Response::from_value(&value);
        if let Some(remote) = &response.log {
            self.logger.merge_remote(remote);
        }
        if response.result && self.config.smart_notify {
            self.logger.retain_alerts();
        }
        *self.inbound.lock().unwrap() = Some(response.clone());
        if clear_after {
            self.outbound.lock().unwrap().clear();
        }

        Ok(response)
    }

    /// Unauthenticated reachability check.
    pub async fn ping(&self) -> Result<bool> {
        Ok(self.call(PING_SERVICE, Vec::new(), true, false).await?.result)
    }

    /// Authenticated handshake: succeeds only if both sides share the key.
    pub async fn connect(&self) -> Result<bool> {
        Ok(self.call(CONNECT_SERVICE, Vec::new(), false, false).await?.result)
    }

    /// Pack a batch result for an inbound request.
    pub fn pack_response(&self, response: &Response, uncrypted: bool) -> Result<String> {
        self.pack(&response.to_value(), uncrypted)
    }
}
