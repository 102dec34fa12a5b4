use std::sync::Arc;

use reqwest::Client;
use tubecast_cache::CacheStore;
use tubecast_extractor::MetadataProvider;

use crate::config::AppConfig;
use crate::delivery::MediaDelivery;
use crate::feed::FeedBuilder;
use crate::gateway::ExtractionGateway;
use crate::warmup::WarmupPool;

/// Shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub feeds: FeedBuilder,
    pub media: MediaDelivery,
}

impl AppState {
    /// Wire the components together. Starts the warmup workers, so it must
    /// run inside the runtime.
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn MetadataProvider>,
        cache: CacheStore,
        http: Client,
    ) -> Self {
        let gateway = ExtractionGateway::new(provider, cache);
        let warmup = WarmupPool::spawn(gateway.clone(), config.warmup_workers, config.warmup_queue);

        Self {
            feeds: FeedBuilder::new(gateway.clone(), warmup),
            media: MediaDelivery::new(gateway, http, config.tmp_dir.clone()),
            config: Arc::new(config),
        }
    }
}
