use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::media::{CollectionMetadata, VideoMetadata};

/// The upstream metadata provider.
///
/// Latency is unbounded and any call may fail. Implementations must be
/// cancel-safe: dropping a returned future abandons the work.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Flat listing of a collection, enumerating at most `max_items` entries
    /// without per-entry extraction
    async fn extract_collection(&self, url: &str, max_items: usize) -> Result<CollectionMetadata>;

    /// Full metadata for one video, every rendition included
    async fn extract_video(&self, url: &str) -> Result<VideoMetadata>;

    /// Download the best video at or below `max_height` plus the best audio,
    /// merged into an mp4 written at `dest`. Intermediate files may be left
    /// next to `dest`, so callers should give it a directory of its own.
    async fn download_merged(&self, url: &str, max_height: u32, dest: &Path) -> Result<()>;
}
