//! # Extraction Gateway
//!
//! Cache-first access to the upstream metadata provider. Collection and
//! video lookups are keyed by stable strings derived from their input, so
//! entries expire independently of each other.
//!
//! Concurrent misses for the same video share one upstream call. Failed
//! calls are never cached.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, info};
use tubecast_cache::CacheStore;
use tubecast_extractor::error::Result;
use tubecast_extractor::youtube::{self, USER_ALIAS_PREFIX};
use tubecast_extractor::{CollectionMetadata, ExtractorError, MetadataProvider, VideoMetadata};

type VideoFlight = Shared<BoxFuture<'static, std::result::Result<VideoMetadata, String>>>;

/// Path of a collection URL with scheme and host dropped.
///
/// A leading `@handle` becomes `_user/handle`. The query string is kept, so
/// playlist ids stay part of the identity.
pub fn collection_path(url: &str) -> String {
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => url.trim_start_matches('/'),
    };

    match path.strip_prefix('@') {
        Some(handle) => format!("{USER_ALIAS_PREFIX}{handle}"),
        None => path.to_string(),
    }
}

/// Key of a rendered feed document
pub fn feed_cache_key(collection_url: &str, max_items: usize) -> String {
    format!("rss::{}::i{max_items}", collection_path(collection_url))
}

/// Key of normalized collection metadata
pub fn collection_meta_key(collection_url: &str, max_items: usize) -> String {
    format!("meta::{}::i{max_items}", collection_path(collection_url))
}

pub fn video_cache_key(video_id: &str) -> String {
    format!("v_{video_id}")
}

#[derive(Clone)]
pub struct ExtractionGateway {
    provider: Arc<dyn MetadataProvider>,
    cache: CacheStore,
    in_flight: Arc<Mutex<HashMap<String, VideoFlight>>>,
}

impl ExtractionGateway {
    pub fn new(provider: Arc<dyn MetadataProvider>, cache: CacheStore) -> Self {
        Self {
            provider,
            cache,
            in_flight: Arc::default(),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn provider(&self) -> &Arc<dyn MetadataProvider> {
        &self.provider
    }

    /// Flat collection metadata, enumerating at most `max_items` entries
    pub async fn resolve_collection(&self, url: &str, max_items: usize) -> Result<CollectionMetadata> {
        let key = collection_meta_key(url, max_items);
        if let Some(collection) = self.cache.get::<CollectionMetadata>(&key).await {
            return Ok(collection);
        }

        info!(url, max_items, "Extracting collection");
        let collection = self.provider.extract_collection(url, max_items).await?;
        self.cache.set(&key, &collection).await;
        Ok(collection)
    }

    /// Full metadata of one video, every rendition included
    pub async fn resolve_video(&self, video_id: &str) -> Result<VideoMetadata> {
        let key = video_cache_key(video_id);
        if let Some(video) = self.cache.get::<VideoMetadata>(&key).await {
            return Ok(video);
        }

        let flight = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(video_id) {
                // Settled flights only linger when their task panicked
                Some(flight) if flight.peek().is_none() => {
                    debug!(video_id, "Joining in-flight extraction");
                    flight.clone()
                }
                _ => {
                    let flight = self.start_flight(video_id, key);
                    in_flight.insert(video_id.to_string(), flight.clone());
                    flight
                }
            }
        };

        flight.await.map_err(ExtractorError::Upstream)
    }

    /// Run one extraction on its own task, so it completes and is cached
    /// even when every caller waiting on it goes away. Must be called with
    /// the `in_flight` lock held; the task leaves the map before settling.
    fn start_flight(&self, video_id: &str, key: String) -> VideoFlight {
        let provider = self.provider.clone();
        let cache = self.cache.clone();
        let in_flight = self.in_flight.clone();
        let url = youtube::video_url(video_id);
        let video_id = video_id.to_string();

        let task = tokio::spawn(async move {
            info!(video_id, "Extracting video");
            let result = match provider.extract_video(&url).await {
                Ok(video) => {
                    cache.set(&key, &video).await;
                    Ok(video)
                }
                Err(e) => Err(e.to_string()),
            };
            in_flight.lock().remove(&video_id);
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(format!("extraction task failed: {e}")))
        }
        .boxed()
        .shared()
    }
}
