//! # tubecast-extractor
//!
//! The seam between tubecast and the upstream metadata provider.
//!
//! - [`MetadataProvider`]: collection listing, per-video metadata and merged
//!   downloads, as an async trait
//! - [`YtDlp`]: the provider implementation driving the `yt-dlp` program
//! - [`media`]: the normalized model stored in the cache
//! - [`select_combined`]: rendition selection
//! - [`youtube`]: URL forms of the hosting site

pub mod error;
pub mod media;
pub mod provider;
pub mod youtube;
pub mod ytdlp;

pub use error::ExtractorError;
pub use media::{
    CollectionMetadata, EntryStub, FormatDescriptor, VideoMetadata, select_combined,
};
pub use provider::MetadataProvider;
pub use ytdlp::YtDlp;
