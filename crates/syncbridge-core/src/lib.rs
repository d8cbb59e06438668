//! # SyncBridge Core
//!
//! Pure primitives for the SyncBridge connector: payload values, the typed
//! XML tree, envelope crypto and protocol records.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Value`] - Nested payload value carried in task params and results
//! - [`Task`] / [`TaskResult`] / [`BatchStats`] - Batch records
//! - [`CommitEvent`] - A queued change notification
//! - [`Fingerprint`] - Content hash of a commit identity, the queue key
//!
//! ## Encodings
//!
//! - [`tree`] converts values to and from self-describing XML
//! - [`crypto`] derives AES-CBC key material from connector credentials
//! - [`canonical`] encodes commit identities deterministically

pub mod canonical;
pub mod commit;
pub mod crypto;
pub mod error;
pub mod task;
pub mod tree;
pub mod types;
pub mod validation;
pub mod value;

pub use commit::{CommitAction, CommitEvent, COMMIT_TASK, OBSOLETE_THRESHOLD};
pub use crypto::{crypt, CipherKind, CipherMaterial, CryptDirection};
pub use error::{CoreError, ValidationError};
pub use task::{BatchStats, Task, TaskResult};
pub use types::Fingerprint;
pub use value::{Map, Value, ValueKind};
