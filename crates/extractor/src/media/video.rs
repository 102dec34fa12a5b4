use serde::{Deserialize, Serialize};

use super::format::{FormatDescriptor, select_combined};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Full metadata for one video, including every rendition the provider
/// reported.
///
/// Cached on its own so repeated media requests for the same id skip
/// re-extraction.
pub struct VideoMetadata {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub formats: Vec<FormatDescriptor>,
}

impl VideoMetadata {
    /// Best combined rendition at or below `max_height`, see [`select_combined`]
    pub fn best_combined(&self, max_height: u32) -> Option<&FormatDescriptor> {
        select_combined(&self.formats, max_height)
    }
}
