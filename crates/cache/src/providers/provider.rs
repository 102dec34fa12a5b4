//! # Cache Provider
//!
//! This module defines the cache provider trait that all cache backends must follow.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::CacheResult;

/// A backend that can store and retrieve JSON values by string key
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Get a live entry, or `None` if it is missing or stale
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Store an entry, replacing any previous value for the key
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CacheResult<()>;

    /// Remove an entry from the cache
    async fn remove(&self, key: &str) -> CacheResult<()>;
}
