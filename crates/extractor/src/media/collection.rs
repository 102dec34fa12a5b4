use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// A channel, playlist or user feed, as returned by one flat extraction.
///
/// Entries keep the provider's order and carry only what a flat listing
/// exposes; per-video formats are resolved separately.
pub struct CollectionMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Page URL reported by the provider, if any
    pub canonical_url: Option<String>,
    /// Uncropped channel avatar, when the provider lists one
    pub thumbnail_url: Option<String>,
    pub entries: Vec<EntryStub>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EntryStub {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub source_url: String,
    /// Unix timestamp of publication, when known
    #[serde(default)]
    pub published_at: Option<i64>,
}

impl CollectionMetadata {
    /// Keep at most `max_items` entries
    pub fn truncate(&mut self, max_items: usize) {
        self.entries.truncate(max_items);
    }
}
