use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about = "Serve video channels and playlists as podcast feeds",
    long_about = "Turns channels, user pages and playlists of a video site into RSS 2.0\n\
                  podcast feeds. Each item either redirects to a direct media URL or is\n\
                  relayed through this server.\n\
                  \n\
                  Every option can also be set through its environment variable or a\n\
                  .env file in the working directory."
)]
pub struct CliArgs {
    /// Address to listen on
    #[arg(long, env = "TUBECAST_BIND", default_value = "0.0.0.0:8000")]
    pub bind: String,

    /// Default number of items per feed
    #[arg(long, env = "TUBECAST_MAX_ITEMS", default_value_t = 10)]
    pub max_items: usize,

    /// Default target height for media renditions
    #[arg(long, env = "TUBECAST_MAX_HEIGHT", default_value_t = 720)]
    pub max_height: u32,

    /// Cache backend
    #[arg(
        long,
        env = "TUBECAST_CACHE_MODE",
        default_value = "disk",
        help = "Cache backend: disk, memory, memcache or none"
    )]
    pub cache_mode: String,

    /// Directory for the disk cache
    #[arg(long, env = "TUBECAST_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Directory for fallback downloads
    #[arg(long, env = "TUBECAST_TMP_DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Cache TTL in seconds
    #[arg(
        long,
        env = "TUBECAST_CACHE_TTL",
        default_value_t = 600,
        help = "Seconds a cached feed or metadata entry stays fresh. Use 0 to disable caching."
    )]
    pub cache_ttl: u64,

    #[arg(long, env = "TUBECAST_MEMCACHE_HOST", default_value = "memcached")]
    pub memcache_host: String,

    #[arg(long, env = "TUBECAST_MEMCACHE_PORT", default_value_t = 11211)]
    pub memcache_port: u16,

    /// Path or name of the yt-dlp program
    #[arg(long, env = "TUBECAST_YTDLP", default_value = "yt-dlp")]
    pub ytdlp: PathBuf,

    /// Workers pre-fetching video metadata after a feed build
    #[arg(long, env = "TUBECAST_WARMUP_WORKERS")]
    pub warmup_workers: Option<usize>,

    /// Log verbosity, overridden by RUST_LOG
    #[arg(long, env = "TUBECAST_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
