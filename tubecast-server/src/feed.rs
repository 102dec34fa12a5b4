//! # Feed Builder
//!
//! Renders collection metadata as an RSS 2.0 podcast feed. Rendered
//! documents are cached per collection and item cap, and a cached document
//! is served verbatim without touching the provider.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tubecast_cache::CacheStore;
use tubecast_extractor::error::Result;
use tubecast_extractor::{CollectionMetadata, EntryStub};

use crate::gateway::{ExtractionGateway, feed_cache_key};
use crate::warmup::WarmupPool;

const GUID_PREFIX: &str = "y2rss::";
const DEFAULT_ITEM_TITLE: &str = "Video";

/// What the cache holds for one rendered feed
#[derive(Debug, Serialize, Deserialize)]
struct CachedFeed {
    xml: String,
}

#[derive(Clone)]
pub struct FeedBuilder {
    gateway: ExtractionGateway,
    cache: CacheStore,
    warmup: WarmupPool,
}

impl FeedBuilder {
    pub fn new(gateway: ExtractionGateway, warmup: WarmupPool) -> Self {
        Self {
            cache: gateway.cache().clone(),
            gateway,
            warmup,
        }
    }

    /// Feed document for `collection_url`, with links rooted at `base_url`.
    ///
    /// A cached document keeps the links it was rendered with.
    pub async fn build_feed(
        &self,
        base_url: &str,
        collection_url: &str,
        max_items: usize,
    ) -> Result<String> {
        let key = feed_cache_key(collection_url, max_items);
        if let Some(cached) = self.cache.get::<CachedFeed>(&key).await {
            debug!(key, "Serving cached feed");
            return Ok(cached.xml);
        }

        let mut collection = self
            .gateway
            .resolve_collection(collection_url, max_items)
            .await?;
        collection.truncate(max_items);

        if let Some(first) = collection.entries.first() {
            self.warmup.schedule(&first.id);
        }

        let xml = render_feed(base_url, collection_url, &collection);
        info!(
            url = collection_url,
            items = collection.entries.len(),
            "Rendered feed"
        );

        self.cache.set(&key, &CachedFeed { xml: xml.clone() }).await;
        Ok(xml)
    }
}

/// Escape text for an XML element or attribute
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Wrap raw text in a CDATA block; an embedded `]]>` is split across two
fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

fn rfc2822(timestamp: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(timestamp, 0).map(|dt| dt.to_rfc2822())
}

/// Render `collection` as an RSS 2.0 document.
///
/// `fallback_link` is used as the channel link when the provider reported no
/// canonical URL, and as the channel title when it reported no title.
pub fn render_feed(base_url: &str, fallback_link: &str, collection: &CollectionMetadata) -> String {
    let base_url = base_url.trim_end_matches('/');
    let title = collection
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback_link);
    let link = collection.canonical_url.as_deref().unwrap_or(fallback_link);
    let description = match collection.description.as_deref() {
        Some(description) if !description.is_empty() => description.to_string(),
        _ => format!("Feed from {title}"),
    };

    let mut xml = String::with_capacity(1024 + collection.entries.len() * 768);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<rss version=\"2.0\">\n<channel>\n");
    let _ = writeln!(xml, "<title>{}</title>", xml_escape(title));
    let _ = writeln!(xml, "<link>{}</link>", xml_escape(link));
    let _ = writeln!(
        xml,
        "<description>{}</description>",
        xml_escape(&description)
    );
    let _ = writeln!(xml, "<lastBuildDate>{}</lastBuildDate>", Utc::now().to_rfc2822());

    if let Some(image) = collection.thumbnail_url.as_deref() {
        let _ = writeln!(
            xml,
            "<image><url>{}</url><title>{}</title><link>{}</link></image>",
            xml_escape(image),
            xml_escape(title),
            xml_escape(link)
        );
    }

    for entry in &collection.entries {
        render_item(&mut xml, base_url, entry);
    }

    xml.push_str("</channel>\n</rss>\n");
    xml
}

fn render_item(xml: &mut String, base_url: &str, entry: &EntryStub) {
    let redirect_url = format!("{base_url}/redirect/{}.mp4", entry.id);
    let proxy_url = format!("{base_url}/video/{}.mp4", entry.id);
    let description = format!(
        "{}\n\n[proxy: {proxy_url}]",
        entry.description.as_deref().unwrap_or_default()
    );

    xml.push_str("<item>\n");
    let _ = writeln!(
        xml,
        "<title>{}</title>",
        xml_escape(entry.title.as_deref().unwrap_or(DEFAULT_ITEM_TITLE))
    );
    let _ = writeln!(xml, "<link>{}</link>", xml_escape(&entry.source_url));
    let _ = writeln!(
        xml,
        "<guid isPermaLink=\"false\">{GUID_PREFIX}{}</guid>",
        xml_escape(&entry.id)
    );
    if let Some(date) = entry.published_at.and_then(rfc2822) {
        let _ = writeln!(xml, "<pubDate>{date}</pubDate>");
    }
    let _ = writeln!(xml, "<description>{}</description>", cdata(&description));
    let _ = writeln!(
        xml,
        "<enclosure url=\"{}\" type=\"video/mp4\" length=\"0\"/>",
        xml_escape(&redirect_url)
    );
    xml.push_str("</item>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::tests::{StubProvider, entry, memory_store};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    const BASE: &str = "http://feeds.local";
    const CHANNEL_URL: &str = "https://www.youtube.com/@chan/videos";

    fn collection(entries: Vec<EntryStub>) -> CollectionMetadata {
        CollectionMetadata {
            title: Some("Chan".into()),
            description: Some("About".into()),
            canonical_url: None,
            thumbnail_url: None,
            entries,
        }
    }

    fn builder(provider: Arc<StubProvider>) -> FeedBuilder {
        let gateway = ExtractionGateway::new(provider, memory_store());
        let warmup = WarmupPool::spawn(gateway.clone(), 1, 4);
        FeedBuilder::new(gateway, warmup)
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            xml_escape(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&apos;s&lt;/a&gt;"
        );
    }

    #[test]
    fn title_is_escaped_and_description_is_raw() {
        let mut item = entry(1);
        item.title = Some(r#"Cats < Dogs & "Birds""#.into());
        item.description = Some("<b>bold</b> & more".into());
        let xml = render_feed(BASE, CHANNEL_URL, &collection(vec![item]));

        assert!(xml.contains("<title>Cats &lt; Dogs &amp; &quot;Birds&quot;</title>"));
        assert!(xml.contains("<![CDATA[<b>bold</b> & more"));
        assert!(!xml.contains("&lt;b&gt;"));
    }

    #[test]
    fn cdata_terminator_is_split() {
        let mut item = entry(1);
        item.description = Some("a ]]> b".into());
        let xml = render_feed(BASE, CHANNEL_URL, &collection(vec![item]));
        assert!(xml.contains("a ]]]]><![CDATA[> b"));
    }

    #[test]
    fn items_link_back_to_this_server() {
        let xml = render_feed(&format!("{BASE}/"), CHANNEL_URL, &collection(vec![entry(7)]));

        assert!(xml.contains(r#"<enclosure url="http://feeds.local/redirect/vid7.mp4" type="video/mp4" length="0"/>"#));
        assert!(xml.contains("[proxy: http://feeds.local/video/vid7.mp4]"));
        assert!(xml.contains(r#"<guid isPermaLink="false">y2rss::vid7</guid>"#));
        assert!(xml.contains(&format!("<link>{CHANNEL_URL}</link>")));
    }

    #[test]
    fn image_only_with_avatar() {
        let mut with_avatar = collection(vec![]);
        assert!(!render_feed(BASE, CHANNEL_URL, &with_avatar).contains("<image>"));

        with_avatar.thumbnail_url = Some("https://img.example/a.jpg".into());
        assert!(render_feed(BASE, CHANNEL_URL, &with_avatar)
            .contains("<image><url>https://img.example/a.jpg</url>"));
    }

    #[test]
    fn pub_date_when_known() {
        let mut dated = entry(1);
        dated.published_at = Some(1_700_000_000);
        let xml = render_feed(BASE, CHANNEL_URL, &collection(vec![dated, entry(2)]));

        assert_eq!(xml.matches("<pubDate>").count(), 1);
        assert!(xml.contains("<pubDate>Tue, 14 Nov 2023 22:13:20 +0000</pubDate>"));
    }

    #[test]
    fn untitled_channel_falls_back_to_its_url() {
        let mut untitled = collection(vec![]);
        untitled.title = None;
        untitled.description = Some(String::new());
        let xml = render_feed(BASE, CHANNEL_URL, &untitled);

        assert!(xml.contains(&format!("<title>{CHANNEL_URL}</title>")));
        assert!(xml.contains(&format!("<description>Feed from {CHANNEL_URL}</description>")));
        assert!(!xml.contains("<title></title>"));

        let described = render_feed(BASE, CHANNEL_URL, &collection(vec![]));
        assert!(described.contains("<title>Chan</title>"));
        assert!(described.contains("<description>About</description>"));
    }

    #[test]
    fn untitled_items_get_a_default() {
        let mut item = entry(1);
        item.title = None;
        let xml = render_feed(BASE, CHANNEL_URL, &collection(vec![item]));
        assert!(xml.contains("<title>Video</title>"));
    }

    #[tokio::test]
    async fn truncates_to_max_items() {
        let provider = Arc::new(StubProvider {
            entries: 50,
            ..Default::default()
        });
        let xml = builder(provider).build_feed(BASE, CHANNEL_URL, 5).await.unwrap();
        assert_eq!(xml.matches("<item>").count(), 5);
    }

    #[tokio::test]
    async fn cached_feed_skips_the_provider() {
        let provider = Arc::new(StubProvider {
            entries: 3,
            ..Default::default()
        });
        let builder = builder(provider.clone());

        let first = builder.build_feed(BASE, CHANNEL_URL, 3).await.unwrap();
        let second = builder
            .build_feed("http://elsewhere", CHANNEL_URL, 3)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.collection_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn warms_the_first_entry() {
        let provider = Arc::new(StubProvider {
            entries: 3,
            ..Default::default()
        });
        builder(provider.clone())
            .build_feed(BASE, CHANNEL_URL, 3)
            .await
            .unwrap();

        for _ in 0..100 {
            if provider.video_calls.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("first entry was not warmed");
    }

    #[tokio::test]
    async fn warmup_failure_does_not_fail_the_feed() {
        let provider = Arc::new(StubProvider {
            entries: 2,
            fail_videos: true,
            ..Default::default()
        });
        let xml = builder(provider).build_feed(BASE, CHANNEL_URL, 2).await.unwrap();
        assert_eq!(xml.matches("<item>").count(), 2);
    }
}
