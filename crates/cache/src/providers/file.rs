//! # File Cache
//!
//! This module implements a file-based persistent cache provider. Each key
//! maps to one JSON record holding the write timestamp and the value.
//! Stale records are deleted when a read discovers them; there is no
//! background sweep.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use tokio::fs;
use tokio::io;
use tracing::{debug, warn};

use super::CacheProvider;
use crate::clock::{self, Clock};
use crate::types::{CacheRecord, CacheResult};

// Longest encoded key used verbatim as a file stem
const MAX_STEM_LEN: usize = 200;

#[derive(Clone)]
pub struct FileCache {
    cache_dir: PathBuf,
    initialized: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    write_seq: Arc<AtomicU64>,
}

impl FileCache {
    /// Create a new file cache storing its records in `cache_dir`
    pub fn new(cache_dir: PathBuf) -> Self {
        Self::with_clock(cache_dir, clock::system())
    }

    pub fn with_clock(cache_dir: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache_dir,
            initialized: Arc::new(AtomicBool::new(false)),
            clock,
            write_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Initialize the cache directory
    pub(crate) async fn ensure_initialized(&self) -> io::Result<()> {
        // Fast path - already initialized
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        // create_dir_all is idempotent, so racing initializers are harmless
        fs::create_dir_all(&self.cache_dir).await?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Get the path for a cached key
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", file_stem(key)))
    }
}

/// URL-safe file stem for a key, hashed when the encoding gets too long
fn file_stem(key: &str) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(key.as_bytes());
    if encoded.len() <= MAX_STEM_LEN {
        return encoded;
    }

    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(key.as_bytes());
    format!("h_{}", hex::encode(hash))
}

#[async_trait]
impl CacheProvider for FileCache {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        self.ensure_initialized().await?;

        let path = self.record_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to read cache record");
                return Ok(None);
            }
        };

        let record: CacheRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = ?path, error = %e, "Discarding unreadable cache record");
                let _ = fs::remove_file(&path).await;
                return Ok(None);
            }
        };

        // Stems differing only in case share a file on case-insensitive
        // filesystems
        if !record.belongs_to(key) {
            debug!(key, "Cache record belongs to another key");
            return Ok(None);
        }

        if record.is_expired(self.clock.now()) {
            debug!(key, "Cache record expired, removing");
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = ?path, error = %e, "Failed to remove expired cache record");
                }
            }
            return Ok(None);
        }

        Ok(Some(record.value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CacheResult<()> {
        self.ensure_initialized().await?;

        let path = self.record_path(key);
        let record = CacheRecord::new(value, self.clock.now(), ttl).with_key(key);
        let json = serde_json::to_vec(&record)?;

        // Write to a private temporary file then rename over the record, so
        // readers only ever see a complete file
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let temp_path = path.with_extension(format!("{}.{seq}.tmp", std::process::id()));

        if let Err(e) = fs::write(&temp_path, &json).await {
            warn!(path = ?temp_path, error = %e, "Failed to write cache record");
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&temp_path, &path).await {
            warn!(
                from = ?temp_path,
                to = ?path,
                error = %e,
                "Failed to rename temporary cache record"
            );
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(key, "Cached entry to file");
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.ensure_initialized().await?;

        let path = self.record_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to remove cache record");
                Err(e.into())
            }
        }
    }
}
