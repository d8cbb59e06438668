//! Process-shared memory cache with per-entry expiry.
//!
//! Share one `Arc<MemoryCache>` between connector sessions to model a cache
//! that outlives a single request.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::traits::BlobStore;

/// Cache availability switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Master switch.
    pub enabled: bool,
    /// True when the host runs as a command-line process.
    pub cli: bool,
    /// Cache enablement for command-line processes.
    pub enabled_in_cli: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cli: false,
            enabled_in_cli: false,
        }
    }
}

impl CacheSettings {
    /// True if the cache may be used under these settings.
    pub fn is_usable(&self) -> bool {
        self.enabled && (!self.cli || self.enabled_in_cli)
    }
}

/// In-memory blob cache.
///
/// Thread-safe via RwLock. Expired entries are dropped on read.
pub struct MemoryCache {
    inner: RwLock<HashMap<String, CacheEntry>>,
    settings: CacheSettings,
}

struct CacheEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

impl MemoryCache {
    /// Create an enabled, empty cache.
    pub fn new() -> Self {
        Self::with_settings(CacheSettings::default())
    }

    pub fn with_settings(settings: CacheSettings) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> CacheSettings {
        self.settings
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.read().unwrap();
        inner.values().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryCache {
    async fn load(&self, key: &str) -> Result<Option<Bytes>> {
        if !self.is_available() {
            return Err(StoreError::Unavailable("memory cache disabled"));
        }
        let now = Instant::now();
        let mut inner = self.inner.write().unwrap();
        match inner.get(key) {
            Some(entry) if entry.is_expired(now) => {
                inner.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        if !self.is_available() {
            return Err(StoreError::Unavailable("memory cache disabled"));
        }
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut inner = self.inner.write().unwrap();
        inner.insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.settings.is_usable()
    }

    fn name(&self) -> &'static str {
        "memory-cache"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load() {
        let cache = MemoryCache::new();
        assert_eq!(cache.load("queue").await.unwrap(), None);

        cache.save("queue", Bytes::from_static(b"abc"), None).await.unwrap();
        assert_eq!(cache.load("queue").await.unwrap(), Some(Bytes::from_static(b"abc")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let cache = MemoryCache::new();
        cache
            .save("queue", Bytes::from_static(b"abc"), Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(cache.load("queue").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_long_ttl_survives() {
        let cache = MemoryCache::new();
        cache
            .save("queue", Bytes::from_static(b"abc"), Some(Duration::from_secs(3600)))
            .await
            .unwrap();
        assert!(cache.load("queue").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cli_enablement() {
        let cli_off = MemoryCache::with_settings(CacheSettings {
            cli: true,
            ..CacheSettings::default()
        });
        assert!(!cli_off.is_available());
        assert!(matches!(
            cli_off.load("queue").await,
            Err(StoreError::Unavailable(_))
        ));

        let cli_on = MemoryCache::with_settings(CacheSettings {
            cli: true,
            enabled_in_cli: true,
            ..CacheSettings::default()
        });
        assert!(cli_on.is_available());

        let disabled = MemoryCache::with_settings(CacheSettings {
            enabled: false,
            ..CacheSettings::default()
        });
        assert!(!disabled.is_available());
    }
}
