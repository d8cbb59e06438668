//! # SyncBridge Wire
//!
//! Envelope codec for the SyncBridge connector: configuration, framing,
//! encryption and the call lifecycle over a pluggable [`Transport`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use syncbridge_wire::{Codec, ConnectorConfig, Logger, MemoryTransport};
//!
//! async fn example() {
//!     let config = ConnectorConfig::from_settings([
//!         ("WsIdentifier", "connector-1"),
//!         ("WsEncryptionKey", "secret"),
//!         ("WsHost", "https://sync.example.com/ws"),
//!     ])
//!     .unwrap();
//!     let transport = Arc::new(MemoryTransport::failing(503, "offline"));
//!     let codec = Codec::new(config, transport, Arc::new(Logger::default()));
//!
//!     // let reachable = codec.ping().await?;
//!     // let response = codec.call("objects", tasks, false, true).await?;
//! }
//! ```
//!
//! ## Call Lifecycle
//!
//! ```text
//! verify ─▶ number tasks ─▶ pack ─▶ Transport::invoke ─▶ unpack ─▶ merge remote log
//!   │                                      │                 │
//!   ▼                                      ▼                 ▼
//! Config                       TransportFault / Timeout   Protocol
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod log;
pub mod messages;
pub mod transport;

pub use codec::{Codec, CONNECT_SERVICE, PING_SERVICE};
pub use config::{ConnectorConfig, Encoding, DEFAULT_TIMEOUT};
pub use error::{Result, WireError};
pub use log::{LogBlock, LogLevel, Logger};
pub use messages::{limits, Request, Response, ServerDescriptor, PROTOCOL_VERSION};
pub use transport::{memory::MemoryTransport, memory::RecordedCall, Transport, TransportFault};
