//! # Cache Types
//!
//! This module defines common types used across the caching system.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which backend serves the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheMode {
    /// One JSON record per key on local disk
    Disk,
    /// Bounded in-process cache, lost on restart
    Memory,
    /// Shared memcached server
    Memcache,
    /// Every lookup misses, every write is dropped
    None,
}

impl CacheMode {
    pub fn as_str(&self) -> &str {
        match self {
            CacheMode::Disk => "disk",
            CacheMode::Memory => "memory",
            CacheMode::Memcache => "memcache",
            CacheMode::None => "none",
        }
    }
}

impl Display for CacheMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CacheMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disk" | "file" => Ok(CacheMode::Disk),
            "memory" | "mem" => Ok(CacheMode::Memory),
            "memcache" | "memcached" => Ok(CacheMode::Memcache),
            "none" | "off" | "disabled" => Ok(CacheMode::None),
            other => Err(CacheError::Config(format!("unknown cache mode '{other}'"))),
        }
    }
}

/// Configuration for the cache system
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Selected backend
    pub mode: CacheMode,
    /// Directory for the disk backend
    pub disk_cache_path: PathBuf,
    /// TTL applied by [`crate::CacheStore::set`]
    pub default_ttl: Duration,
    /// Memcached host name
    pub memcache_host: String,
    /// Memcached port
    pub memcache_port: u16,
    /// Upper bound on a single memcached round trip, connect included
    pub memcache_timeout: Duration,
    /// Maximum number of entries held by the memory backend
    pub max_memory_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::Disk,
            disk_cache_path: std::env::temp_dir().join("tubecast-cache"),
            default_ttl: Duration::from_secs(600),
            memcache_host: "memcached".to_string(),
            memcache_port: 11211,
            memcache_timeout: Duration::from_secs(2),
            max_memory_entries: 10_000,
        }
    }
}

/// What a persistent backend stores for one key.
///
/// `cached_at` is in seconds since the Unix epoch; the record is visible
/// while `now - cached_at <= ttl`. `key` is set by backends whose storage
/// location could be shared by two keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(rename = "_cached_at")]
    pub cached_at: u64,
    #[serde(default)]
    pub ttl: u64,
    #[serde(rename = "_key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: Value,
}

impl CacheRecord {
    pub fn new(value: Value, cached_at: u64, ttl: Duration) -> Self {
        Self {
            cached_at,
            ttl: ttl.as_secs(),
            key: None,
            value,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Whether the record was written for `key`. Records without a key
    /// belong to whoever reads them.
    pub fn belongs_to(&self, key: &str) -> bool {
        self.key.as_deref().is_none_or(|own| own == key)
    }

    /// Check if the record is stale at `now`
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.cached_at) > self.ttl
    }
}

/// Errors raised by cache backends.
///
/// [`crate::CacheStore`] never lets these reach its callers: reads degrade
/// to a miss and writes to a logged no-op.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid cache configuration: {0}")]
    Config(String),
}

/// Result of a cache operation
pub type CacheResult<T> = std::result::Result<T, CacheError>;
