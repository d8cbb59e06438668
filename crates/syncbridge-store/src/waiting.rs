//! The waiting queue: deferred commit events keyed by fingerprint.
//!
//! The whole queue is one blob in a [`BlobStore`]. Every mutation is a
//! read-modify-write of that blob. Within a process those are serialized;
//! writers in other processes may still lose an update, which at worst
//! causes one redundant redelivery.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use indexmap::IndexMap;
use syncbridge_core::{CommitEvent, Fingerprint};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::migration;
use crate::record;
use crate::traits::BlobStore;

/// Queued events in insertion order.
pub type WaitingEvents = IndexMap<Fingerprint, CommitEvent>;

/// Domain separation for storage key derivation.
const STORAGE_KEY_CONTEXT: &str = "syncbridge 2024 waiting queue key v1";

/// Storage key of the waiting queue for one installation.
///
/// Derived from the connector identity so two connectors sharing a cache or
/// a directory never share a queue.
pub fn storage_key(identifier: &str, host: &str) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(STORAGE_KEY_CONTEXT);
    hasher.update(&(identifier.len() as u64).to_le_bytes());
    hasher.update(identifier.as_bytes());
    hasher.update(host.as_bytes());
    let hash = hasher.finalize();
    format!("syncbridge-waiting-{}", hex::encode(&hash.as_bytes()[..12]))
}

/// Pick the preferred backend: the cache when it is usable, else the fallback.
pub fn select_backend(
    cache: Option<Arc<dyn BlobStore>>,
    fallback: Arc<dyn BlobStore>,
) -> Arc<dyn BlobStore> {
    match cache {
        Some(cache) if cache.is_available() => {
            tracing::debug!(backend = cache.name(), "waiting queue backend selected");
            cache
        }
        _ => {
            tracing::debug!(backend = fallback.name(), "waiting queue backend selected");
            fallback
        }
    }
}

/// Durable map from fingerprint to queued commit event.
///
/// Mutations hold a write lock shared by every clone, so within one process
/// a read-modify-write never overwrites another one.
#[derive(Clone)]
pub struct WaitingStore {
    backend: Arc<dyn BlobStore>,
    key: String,
    ttl: Option<Duration>,
    writer: Arc<Mutex<()>>,
}

impl WaitingStore {
    pub fn new(backend: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            ttl: None,
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Expire the queue blob after `ttl` on backends that support expiry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Load every queued event.
    ///
    /// A legacy line file is migrated and rewritten in the record format.
    /// Obsolete events are never returned.
    pub async fn load_all(&self) -> Result<WaitingEvents> {
        let _writer = self.writer.lock().await;
        Ok(self.read().await?.0)
    }

    /// Replace the stored queue with `events`, leaving out obsolete ones.
    pub async fn save_all(&self, events: &WaitingEvents) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.write(events).await
    }

    /// Apply `f` to the current queue and save the result.
    pub async fn modify<T>(&self, f: impl FnOnce(&mut WaitingEvents) -> T) -> Result<T> {
        let _writer = self.writer.lock().await;
        let (mut events, _) = self.read().await?;
        let out = f(&mut events);
        self.write(&events).await?;
        Ok(out)
    }

    /// Drop obsolete events still present in the stored blob.
    ///
    /// Returns how many were dropped. The blob is only rewritten if any were.
    pub async fn prune(&self) -> Result<usize> {
        let _writer = self.writer.lock().await;
        let (events, obsolete) = self.read().await?;
        if obsolete > 0 {
            self.write(&events).await?;
        }
        Ok(obsolete)
    }

    /// Insert or overwrite the entry with the event's fingerprint.
    ///
    /// Returns true if an entry with the same fingerprint was replaced.
    pub async fn upsert(&self, event: CommitEvent) -> Result<bool> {
        if event.is_obsolete() {
            return Ok(false);
        }
        self.modify(|events| events.insert(event.fingerprint, event).is_some())
            .await
    }

    /// Remove the entry for `fingerprint`. Returns true if it existed.
    pub async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool> {
        self.modify(|events| events.shift_remove(fingerprint).is_some())
            .await
    }

    /// Swap the entry for `current.fingerprint` with `next`, or remove it when
    /// `next` is `None`, but only if the stored entry still equals `current`.
    ///
    /// Returns false and leaves the queue untouched when the entry was
    /// replaced or removed in the meantime.
    pub async fn replace(&self, current: &CommitEvent, next: Option<CommitEvent>) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let (mut events, obsolete) = self.read().await?;
        if events.get(&current.fingerprint) != Some(current) {
            if obsolete > 0 {
                self.write(&events).await?;
            }
            return Ok(false);
        }
        match next {
            Some(next) => {
                events.insert(current.fingerprint, next);
            }
            None => {
                events.shift_remove(&current.fingerprint);
            }
        }
        self.write(&events).await?;
        Ok(true)
    }

    /// Number of queued events.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.load_all().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Live events and the number of obsolete ones left out. Callers hold `writer`.
    async fn read(&self) -> Result<(WaitingEvents, usize)> {
        let bytes = match self.backend.load(&self.key).await? {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Ok((WaitingEvents::new(), 0)),
        };

        if migration::is_legacy(&bytes) {
            let text = String::from_utf8_lossy(&bytes);
            let migrated = migration::read_legacy(&text);
            tracing::info!(
                events = migrated.events.len(),
                skipped = migrated.skipped,
                obsolete = migrated.obsolete,
                "migrating legacy waiting queue"
            );
            let (events, obsolete) = to_map(migrated.events);
            self.write(&events).await?;
            return Ok((events, obsolete + migrated.obsolete));
        }

        let decoded = record::decode_records(&bytes)?;
        if decoded.dropped > 0 {
            tracing::warn!(dropped = decoded.dropped, "dropped unreadable waiting queue records");
        }
        Ok(to_map(decoded.events))
    }

    async fn write(&self, events: &WaitingEvents) -> Result<()> {
        let bytes = record::encode_records(events.values().filter(|e| !e.is_obsolete()))?;
        self.backend.save(&self.key, Bytes::from(bytes), self.ttl).await
    }
}

fn to_map(events: Vec<CommitEvent>) -> (WaitingEvents, usize) {
    let total = events.len();
    let live: WaitingEvents = events
        .into_iter()
        .filter(|e| !e.is_obsolete())
        .map(|e| (e.fingerprint, e))
        .collect();
    let obsolete = total - live.len();
    (live, obsolete)
}
