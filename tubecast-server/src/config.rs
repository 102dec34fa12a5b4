use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tubecast_cache::{CacheConfig, CacheMode};

use crate::cli::CliArgs;

/// Upper bound on the default warmup pool size
const MAX_DEFAULT_WORKERS: usize = 4;

/// Configuration for the entire program, built once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,

    /// Feed length when a request names none
    pub max_items: usize,

    /// Target height when a media request names none
    pub max_height: u32,

    pub cache: CacheConfig,

    /// Where fallback downloads are written
    pub tmp_dir: PathBuf,

    pub ytdlp: PathBuf,

    pub warmup_workers: usize,

    /// Pending warmup jobs beyond which new ones are dropped
    pub warmup_queue: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_items: 10,
            max_height: 720,
            cache: CacheConfig {
                disk_cache_path: default_root().join("cache"),
                ..CacheConfig::default()
            },
            tmp_dir: default_root().join("tmp"),
            ytdlp: PathBuf::from("yt-dlp"),
            warmup_workers: default_workers(),
            warmup_queue: 64,
        }
    }
}

fn default_root() -> PathBuf {
    std::env::temp_dir().join("tubecast")
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

impl AppConfig {
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let defaults = Self::default();

        let bind = args
            .bind
            .parse()
            .with_context(|| format!("invalid bind address '{}'", args.bind))?;
        if args.max_items == 0 {
            bail!("max items must be at least 1");
        }
        if args.max_height == 0 {
            bail!("max height must be at least 1");
        }
        let mode: CacheMode = args.cache_mode.parse()?;

        let warmup_workers = args.warmup_workers.unwrap_or(defaults.warmup_workers).max(1);

        Ok(Self {
            bind,
            max_items: args.max_items,
            max_height: args.max_height,
            cache: CacheConfig {
                mode,
                disk_cache_path: args
                    .cache_dir
                    .clone()
                    .unwrap_or(defaults.cache.disk_cache_path.clone()),
                default_ttl: Duration::from_secs(args.cache_ttl),
                memcache_host: args.memcache_host.clone(),
                memcache_port: args.memcache_port,
                ..defaults.cache
            },
            tmp_dir: args.tmp_dir.clone().unwrap_or(defaults.tmp_dir),
            ytdlp: args.ytdlp.clone(),
            warmup_workers,
            warmup_queue: defaults.warmup_queue.max(warmup_workers * 8),
        })
    }

    /// Create the directories the server writes into
    pub async fn prepare_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.tmp_dir)
            .await
            .with_context(|| format!("creating temp dir {}", self.tmp_dir.display()))?;
        if self.cache.mode == CacheMode::Disk {
            tokio::fs::create_dir_all(&self.cache.disk_cache_path)
                .await
                .with_context(|| {
                    format!("creating cache dir {}", self.cache.disk_cache_path.display())
                })?;
        }
        Ok(())
    }
}
