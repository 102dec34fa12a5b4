//! # tubecast-cache
//!
//! A small key/value cache for JSON values with a per-entry TTL.
//!
//! ## Backends
//!
//! - [`FileCache`]: one JSON record per key on disk, lazily evicted on read
//! - [`MemoryCache`]: bounded in-process cache backed by Moka
//! - [`MemcacheCache`]: a shared memcached server, expiry enforced server-side
//! - [`NoopCache`]: every read misses
//!
//! Callers go through [`CacheStore`], which never surfaces backend errors.

pub mod clock;
pub mod providers;
mod store;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use providers::{CacheProvider, FileCache, MemcacheCache, MemoryCache, NoopCache};
pub use store::CacheStore;
pub use types::{CacheConfig, CacheError, CacheMode, CacheRecord, CacheResult};
