//! # Memory Cache Provider
//!
//! This module provides an in-memory cache implementation using Moka caching.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use serde_json::Value;
use tracing::debug;

use super::CacheProvider;
use crate::clock::{self, Clock};
use crate::types::{CacheRecord, CacheResult};

/// Memory cache provider implementation using Moka
#[derive(Clone)]
pub struct MemoryCache {
    cache: MokaCache<String, Arc<CacheRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    /// Create a new memory cache holding at most `max_entries` keys
    pub fn new(max_entries: u64) -> Self {
        Self::with_clock(max_entries, clock::system())
    }

    pub fn with_clock(max_entries: u64, clock: Arc<dyn Clock>) -> Self {
        let cache = MokaCache::builder().max_capacity(max_entries.max(1)).build();

        debug!(max_entries, "Memory cache created");

        Self { cache, clock }
    }
}

#[async_trait]
impl CacheProvider for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let Some(record) = self.cache.get(key).await else {
            return Ok(None);
        };

        // Entries carry their own TTL, so expiry is checked here rather than
        // by a cache-wide Moka policy
        if record.is_expired(self.clock.now()) {
            debug!(key, "Memory cache entry expired");
            self.cache.invalidate(key).await;
            return Ok(None);
        }

        Ok(Some(record.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CacheResult<()> {
        let record = CacheRecord::new(value, self.clock.now(), ttl);
        self.cache.insert(key.to_string(), Arc::new(record)).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}
