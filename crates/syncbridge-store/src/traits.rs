//! BlobStore trait: the abstract interface for keyed byte persistence.
//!
//! The waiting queue is stored as one blob. Implementations include a
//! process-shared TTL cache and a per-installation file store.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Async interface for keyed blob persistence.
///
/// A save replaces the whole blob; there are no partial updates.
#[async_trait]
pub trait BlobStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Blob Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Load the blob stored under `key`, if any.
    async fn load(&self, key: &str) -> Result<Option<Bytes>>;

    /// Replace the blob stored under `key`.
    ///
    /// Backends without expiry ignore `ttl`.
    async fn save(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Backend Info
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the backend is usable in the current runtime.
    fn is_available(&self) -> bool {
        true
    }

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
