//! Pass-through backend used when caching is turned off.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::CacheProvider;
use crate::types::CacheResult;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl CacheProvider for NoopCache {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn get(&self, _key: &str) -> CacheResult<Option<Value>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> CacheResult<()> {
        Ok(())
    }
}
