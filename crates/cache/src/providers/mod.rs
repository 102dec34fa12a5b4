//! # Cache Providers
//!
//! This module contains the interchangeable cache backends.

pub use self::file::FileCache;
pub use self::memcache::MemcacheCache;
pub use self::memory::MemoryCache;
pub use self::noop::NoopCache;
pub use self::provider::CacheProvider;

// Provider interface
pub mod provider;

// Individual provider implementations
pub mod file;
pub mod memcache;
pub mod memory;
pub mod noop;
