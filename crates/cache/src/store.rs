//! # Cache Store
//!
//! The handle every other component talks to. It wraps one backend chosen at
//! startup and absorbs backend failures: a failed read is a miss and a
//! failed write is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::providers::{CacheProvider, FileCache, MemcacheCache, MemoryCache, NoopCache};
use crate::types::{CacheConfig, CacheMode, CacheResult};

const PROBE_KEY: &str = "__tubecast_probe";

#[derive(Clone)]
pub struct CacheStore {
    provider: Arc<dyn CacheProvider>,
    default_ttl: Duration,
}

impl CacheStore {
    /// Build the backend selected by `config`
    pub async fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        let provider: Arc<dyn CacheProvider> = match config.mode {
            CacheMode::None => Arc::new(NoopCache),
            CacheMode::Memory => Arc::new(MemoryCache::new(config.max_memory_entries)),
            CacheMode::Disk => {
                let cache = FileCache::new(config.disk_cache_path.clone());
                cache.ensure_initialized().await?;
                info!(path = ?config.disk_cache_path, "Using disk cache");
                Arc::new(cache)
            }
            CacheMode::Memcache => {
                let cache = MemcacheCache::new(
                    config.memcache_host.clone(),
                    config.memcache_port,
                    config.memcache_timeout,
                );
                info!(addr = %cache.addr(), "Using memcached");
                Arc::new(cache)
            }
        };

        Ok(Self::new(provider, config.default_ttl))
    }

    pub fn new(provider: Arc<dyn CacheProvider>, default_ttl: Duration) -> Self {
        Self {
            provider,
            default_ttl,
        }
    }

    /// A store that never holds anything
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopCache), Duration::ZERO)
    }

    pub fn backend(&self) -> &'static str {
        self.provider.name()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Raw lookup. Backend errors read as a miss.
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        match self.provider.get(key).await {
            Ok(Some(value)) => {
                debug!(key, backend = self.provider.name(), "Cache hit");
                Some(value)
            }
            Ok(None) => {
                debug!(key, backend = self.provider.name(), "Cache miss");
                None
            }
            Err(e) => {
                warn!(key, backend = self.provider.name(), error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Typed lookup. A value that no longer decodes as `T` is a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key, error = %e, "Cached value has an unexpected shape, ignoring");
                None
            }
        }
    }

    /// Store `value` under `key` with the default TTL
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    /// Store `value` under `key`. A zero TTL stores nothing.
    pub async fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Value cannot be cached");
                return;
            }
        };

        if let Err(e) = self.provider.set(key, value, ttl).await {
            warn!(key, backend = self.provider.name(), error = %e, "Cache write failed, continuing uncached");
        }
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.provider.remove(key).await {
            warn!(key, backend = self.provider.name(), error = %e, "Cache remove failed");
        }
    }

    /// Write and read back a sentinel; reports whether the backend works.
    pub async fn probe(&self) -> bool {
        self.set(PROBE_KEY, "UP").await;
        let status: Option<String> = self.get(PROBE_KEY).await;
        let healthy = status.as_deref() == Some("UP");

        if healthy {
            info!(backend = self.provider.name(), "Cache backend is answering");
        } else if self.provider.name() != "none" && !self.default_ttl.is_zero() {
            warn!(backend = self.provider.name(), "Cache backend failed its startup probe, serving uncached");
        }

        healthy
    }
}
