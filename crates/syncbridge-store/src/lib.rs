//! # SyncBridge Store
//!
//! Persistence for the SyncBridge connector. Deferred commit events live in a
//! [`WaitingStore`]: a fingerprint-keyed map stored as one blob in a
//! [`BlobStore`].
//!
//! ## Key Types
//!
//! - [`BlobStore`] - The async trait for keyed blob persistence
//! - [`MemoryCache`] - Process-shared cache with per-entry TTL
//! - [`FileStore`] - One file per key in an installation directory
//! - [`WaitingStore`] - The durable commit waiting queue
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use syncbridge_store::{select_backend, storage_key, FileStore, MemoryCache, WaitingStore};
//!
//! async fn example() {
//!     let backend = select_backend(
//!         Some(Arc::new(MemoryCache::new())),
//!         Arc::new(FileStore::new("/var/lib/connector")),
//!     );
//!     let queue = WaitingStore::new(backend, storage_key("connector-id", "https://sync.example.com"));
//!     let pending = queue.load_all().await.unwrap();
//!     println!("{} events waiting", pending.len());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Dedup**: Events with the same fingerprint collapse to one entry (last write wins)
//! - **Versioned format**: See [`record`]; a torn write loses at most the trailing record
//! - **Legacy files**: Line-oriented JSON queues are migrated on first load

pub mod error;
pub mod file;
pub mod memory;
pub mod migration;
pub mod record;
pub mod traits;
pub mod waiting;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::{CacheSettings, MemoryCache};
pub use traits::BlobStore;
pub use waiting::{select_backend, storage_key, WaitingEvents, WaitingStore};
