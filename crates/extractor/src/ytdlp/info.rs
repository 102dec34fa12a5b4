//! Subset of the `--dump-single-json` payload.
//!
//! Every field is optional because flat listings, old uploads and
//! unavailable entries all leave holes.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::media::{CollectionMetadata, EntryStub, FormatDescriptor, VideoMetadata};
use crate::youtube;

/// Thumbnail id carrying the uncropped channel avatar
const AVATAR_THUMBNAIL_ID: &str = "avatar_uncropped";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct InfoJson {
    id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    timestamp: Option<i64>,
    release_timestamp: Option<i64>,
    upload_date: Option<String>,
    thumbnails: Option<Vec<ThumbnailJson>>,
    entries: Option<Vec<Option<InfoJson>>>,
    formats: Option<Vec<FormatJson>>,
    // Single-format results carry their own media fields at the top level
    ext: Option<String>,
    height: Option<u32>,
    vcodec: Option<String>,
    acodec: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThumbnailJson {
    id: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FormatJson {
    format_id: Option<String>,
    ext: Option<String>,
    height: Option<u32>,
    vcodec: Option<String>,
    acodec: Option<String>,
    url: Option<String>,
}

/// A codec field of "none" means the track is absent; a missing field does not
fn has_track(codec: &Option<String>) -> bool {
    codec.as_deref() != Some("none")
}

impl From<FormatJson> for FormatDescriptor {
    fn from(f: FormatJson) -> Self {
        Self {
            has_video: has_track(&f.vcodec),
            has_audio: has_track(&f.acodec),
            format_id: f.format_id,
            extension: f.ext.unwrap_or_default().to_lowercase(),
            height: f.height,
            url: f.url,
        }
    }
}

impl InfoJson {
    /// Best-effort id: the explicit one, else the `v=` parameter of the URL
    fn entry_id(&self) -> Option<String> {
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        let (_, query) = self.url.as_deref()?.rsplit_once("v=")?;
        let id = query.split('&').next()?;
        (!id.is_empty()).then(|| id.to_string())
    }

    fn published_at(&self) -> Option<i64> {
        self.timestamp.or(self.release_timestamp).or_else(|| {
            let date = NaiveDate::parse_from_str(self.upload_date.as_deref()?, "%Y%m%d").ok()?;
            Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
        })
    }

    fn into_entry(self) -> Option<EntryStub> {
        let id = self.entry_id()?;
        let published_at = self.published_at();
        let source_url = self
            .url
            .filter(|u| u.starts_with("http"))
            .or(self.webpage_url)
            .unwrap_or_else(|| youtube::video_url(&id));

        Some(EntryStub {
            id,
            title: self.title,
            description: self.description,
            source_url,
            published_at,
        })
    }

    pub(crate) fn into_collection(self) -> CollectionMetadata {
        let thumbnail_url = self
            .thumbnails
            .unwrap_or_default()
            .into_iter()
            .find(|t| t.id.as_deref() == Some(AVATAR_THUMBNAIL_ID))
            .and_then(|t| t.url);

        let title = self.title;
        let description = self.description;
        let canonical_url = self.webpage_url.clone();

        // A collection URL that resolves to a single video lists itself
        let entries = match self.entries {
            Some(entries) => entries
                .into_iter()
                .flatten()
                .filter_map(InfoJson::into_entry)
                .collect(),
            None => InfoJson {
                id: self.id,
                title: title.clone(),
                description: description.clone(),
                url: self.url,
                webpage_url: self.webpage_url,
                timestamp: self.timestamp,
                release_timestamp: self.release_timestamp,
                upload_date: self.upload_date,
                ..InfoJson::default()
            }
            .into_entry()
            .into_iter()
            .collect(),
        };

        CollectionMetadata {
            title,
            description,
            canonical_url,
            thumbnail_url,
            entries,
        }
    }

    pub(crate) fn into_video(self, fallback_id: &str) -> VideoMetadata {
        let id = self
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| fallback_id.to_string());

        let formats = match self.formats {
            Some(formats) => formats.into_iter().map(FormatDescriptor::from).collect(),
            // Some sites report a single direct URL instead of a format list
            None => self
                .url
                .clone()
                .map(|url| {
                    vec![FormatDescriptor::from(FormatJson {
                        format_id: None,
                        ext: self.ext.clone(),
                        height: self.height,
                        vcodec: self.vcodec.clone(),
                        acodec: self.acodec.clone(),
                        url: Some(url),
                    })]
                })
                .unwrap_or_default(),
        };

        VideoMetadata {
            id,
            title: self.title,
            description: self.description,
            formats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNEL: &str = r#"{
        "id": "UC123",
        "title": "Some Channel - Videos",
        "description": "About <this> channel",
        "webpage_url": "https://www.youtube.com/@some/videos",
        "thumbnails": [
            {"id": "banner_uncropped", "url": "https://img.example/banner.jpg"},
            {"id": "avatar_uncropped", "url": "https://img.example/avatar.jpg"}
        ],
        "entries": [
            {"_type": "url", "id": "aaa", "title": "First", "url": "https://www.youtube.com/watch?v=aaa", "timestamp": 1700000000},
            null,
            {"_type": "url", "url": "https://www.youtube.com/watch?v=bbb", "upload_date": "20240102"},
            {"_type": "url", "title": "No id at all"}
        ]
    }"#;

    #[test]
    fn parses_flat_channel_listing() {
        let info: InfoJson = serde_json::from_str(CHANNEL).unwrap();
        let collection = info.into_collection();

        assert_eq!(collection.title.as_deref(), Some("Some Channel - Videos"));
        assert_eq!(
            collection.thumbnail_url.as_deref(),
            Some("https://img.example/avatar.jpg")
        );
        assert_eq!(collection.entries.len(), 2);

        let first = &collection.entries[0];
        assert_eq!(first.id, "aaa");
        assert_eq!(first.published_at, Some(1_700_000_000));

        let second = &collection.entries[1];
        assert_eq!(second.id, "bbb");
        assert_eq!(second.source_url, "https://www.youtube.com/watch?v=bbb");
        assert_eq!(second.published_at, Some(1_704_153_600));
    }

    #[test]
    fn missing_avatar_leaves_thumbnail_empty() {
        let info: InfoJson = serde_json::from_str(
            r#"{"title": "t", "thumbnails": [{"id": "0", "url": "https://img.example/0.jpg"}], "entries": []}"#,
        )
        .unwrap();
        let collection = info.into_collection();
        assert!(collection.thumbnail_url.is_none());
        assert!(collection.entries.is_empty());
    }

    #[test]
    fn single_video_lists_itself() {
        let info: InfoJson = serde_json::from_str(
            r#"{"id": "solo", "title": "Solo", "webpage_url": "https://www.youtube.com/watch?v=solo"}"#,
        )
        .unwrap();
        let collection = info.into_collection();
        assert_eq!(collection.entries.len(), 1);
        assert_eq!(collection.entries[0].id, "solo");
        assert_eq!(collection.entries[0].title.as_deref(), Some("Solo"));
    }

    #[test]
    fn parses_video_formats() {
        let info: InfoJson = serde_json::from_str(
            r#"{
                "id": "vid",
                "title": "A video",
                "formats": [
                    {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "url": "https://m/140"},
                    {"format_id": "137", "ext": "mp4", "height": 1080, "vcodec": "avc1", "acodec": "none", "url": "https://m/137"},
                    {"format_id": "18", "ext": "MP4", "height": 360, "vcodec": "avc1", "acodec": "mp4a.40.2", "url": "https://m/18"}
                ]
            }"#,
        )
        .unwrap();
        let video = info.into_video("ignored");

        assert_eq!(video.id, "vid");
        assert_eq!(video.formats.len(), 3);
        assert!(!video.formats[0].has_video && video.formats[0].has_audio);
        assert!(video.formats[1].has_video && !video.formats[1].has_audio);

        let best = video.best_combined(720).unwrap();
        assert_eq!(best.format_id.as_deref(), Some("18"));
        assert_eq!(best.extension, "mp4");
    }

    #[test]
    fn direct_url_becomes_single_format() {
        let info: InfoJson = serde_json::from_str(
            r#"{"title": "clip", "url": "https://cdn.example/clip.mp4", "ext": "mp4", "height": 480}"#,
        )
        .unwrap();
        let video = info.into_video("clip-id");
        assert_eq!(video.id, "clip-id");
        assert_eq!(video.formats.len(), 1);
        assert!(video.formats[0].is_combined());
    }
}
