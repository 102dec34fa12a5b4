//! # tubecast
//!
//! Serves channels, user pages and playlists of a video site as RSS 2.0
//! podcast feeds, and their videos as redirects or relayed MP4 streams.
//!
//! Requests flow through three components sharing one [`ExtractionGateway`]:
//!
//! - [`FeedBuilder`] renders and caches feed documents
//! - [`MediaDelivery`] redirects to or streams a single video
//! - [`WarmupPool`] pre-fetches video metadata after a feed build
//!
//! [`ExtractionGateway`]: gateway::ExtractionGateway
//! [`FeedBuilder`]: feed::FeedBuilder
//! [`MediaDelivery`]: delivery::MediaDelivery
//! [`WarmupPool`]: warmup::WarmupPool

pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod routes;
pub mod state;
pub mod warmup;

pub use config::AppConfig;
pub use error::AppError;
pub use routes::router;
pub use state::AppState;
