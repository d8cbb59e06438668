//! # SyncBridge
//!
//! Connector between a host application and a remote synchronization
//! server. The server drives the host through task batches; the host
//! reports local changes back as commits.
//!
//! ## Overview
//!
//! - **Inbound**: [`Connector::handle_request`] decrypts a server request,
//!   runs its tasks against the registered object types and packs the answer
//! - **Outbound**: [`Connector::ping`], [`Connector::connect`] and
//!   [`Connector::commit`] call the server through a [`Transport`](wire::Transport)
//! - **Deferred commits**: with post-commit enabled, commits are parked in a
//!   durable waiting queue and delivered by [`Connector::flush`] after the
//!   host has answered its own request
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use syncbridge::{Connector, QueueConfig};
//! use syncbridge::core::CommitAction;
//! use syncbridge::router::{HostIntegration, Registry};
//! use syncbridge::wire::{ConnectorConfig, MemoryTransport};
//!
//! async fn example(host: Arc<dyn HostIntegration>) -> syncbridge::Result<()> {
//!     let config = ConnectorConfig::new("connector-1", "ThisIsSecretKey", "https://sync.example.com")
//!         .with_post_commit(true);
//!
//!     let connector = Connector::builder(config)
//!         .transport(Arc::new(MemoryTransport::failing(503, "offline")))
//!         .host(host)
//!         .registry(Arc::new(Registry::new()))
//!         .queue_dir("/var/lib/syncbridge")
//!         .queue_config(QueueConfig::default())
//!         .build()?;
//!
//!     connector
//!         .commit("Product", ["12"], CommitAction::Update, "admin", "price change")
//!         .await;
//!
//!     // After the response has been sent:
//!     let report = connector.flush().await?;
//!     println!("delivered {}", report.delivered);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `syncbridge::core` - Values, XML tree codec, crypto, protocol records
//! - `syncbridge::store` - Blob stores and the waiting queue
//! - `syncbridge::wire` - Configuration, transport, logger and codec
//! - `syncbridge::router` - Registry, object locks and task router

pub mod clock;
pub mod commit;
pub mod config;
pub mod connector;
pub mod error;

// Re-export component crates
pub use syncbridge_core as core;
pub use syncbridge_router as router;
pub use syncbridge_store as store;
pub use syncbridge_wire as wire;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use commit::{CommitOutcome, CommitQueue, CommitRecord, FlushReport};
pub use config::{QueueConfig, RetryPolicy, MAX_FLUSH_FAILURES};
pub use connector::{Connector, ConnectorBuilder};
pub use error::{ConnectorError, Result};

// Re-export commonly used core types
pub use syncbridge_core::{CommitAction, CommitEvent, Fingerprint, Value, OBSOLETE_THRESHOLD};
