//! URL forms of the hosting site.

use url::form_urlencoded;

pub const SITE_BASE: &str = "https://www.youtube.com";

/// Prefixes of `.rss` paths that already name a collection kind
const COLLECTION_PREFIXES: [&str; 3] = ["c/", "channel/", "user/"];

/// Alias prefix standing for an `@handle`
pub const USER_ALIAS_PREFIX: &str = "_user/";

pub fn video_url(video_id: &str) -> String {
    site_url("watch", "v", video_id)
}

pub fn playlist_url(list_id: &str) -> String {
    site_url("playlist", "list", list_id)
}

/// Map the path of a `/{path}.rss` request to the collection it names.
///
/// `_user/<handle>` and `@<handle>` become the handle's page, `c/`,
/// `channel/` and `user/` are taken as-is, and anything else is guessed to
/// be a `c/` custom URL. Channel pages always point at their video tab.
pub fn collection_url_for_path(path: &str) -> String {
    let path = path.trim_matches('/');

    let target = if let Some(handle) = path.strip_prefix(USER_ALIAS_PREFIX) {
        format!("{SITE_BASE}/@{handle}")
    } else if path.starts_with('@') || COLLECTION_PREFIXES.iter().any(|p| path.starts_with(p)) {
        format!("{SITE_BASE}/{path}")
    } else {
        format!("{SITE_BASE}/c/{path}")
    };

    with_videos_tab(target)
}

fn with_videos_tab(url: String) -> String {
    if url.ends_with("/videos") {
        url
    } else {
        format!("{url}/videos")
    }
}

fn site_url(path: &str, param: &str, value: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair(param, value)
        .finish();
    format!("{SITE_BASE}/{path}?{query}")
}
