//! HTTP surface.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tubecast_extractor::youtube;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

const FEED_CONTENT_TYPE: &str = "text/xml; charset=utf-8";
const FEED_SUFFIX: &str = ".rss";
const MEDIA_SUFFIX: &str = ".mp4";
const FORWARDED_PROTO: &str = "x-forwarded-proto";

#[derive(Debug, Deserialize)]
struct FeedQuery {
    max_items: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct PlaylistQuery {
    list: String,
    max_items: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct MediaQuery {
    height: Option<u32>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/playlist.rss", get(playlist_feed))
        .route("/redirect/{file}", get(redirect_video))
        .route("/video/{file}", get(stream_video))
        .route("/{*path}", get(collection_feed))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn playlist_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PlaylistQuery>,
) -> AppResult<Response> {
    if query.list.trim().is_empty() {
        return Err(AppError::BadRequest("missing playlist id".to_string()));
    }
    let url = youtube::playlist_url(query.list.trim());
    serve_feed(&state, &headers, &url, query.max_items).await
}

async fn collection_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<String>,
    Query(query): Query<FeedQuery>,
) -> AppResult<Response> {
    let stem = path
        .strip_suffix(FEED_SUFFIX)
        .map(|stem| stem.trim_matches('/'))
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| AppError::NotFound("not found".to_string()))?;

    let url = youtube::collection_url_for_path(stem);
    serve_feed(&state, &headers, &url, query.max_items).await
}

async fn serve_feed(
    state: &AppState,
    headers: &HeaderMap,
    collection_url: &str,
    max_items: Option<usize>,
) -> AppResult<Response> {
    let max_items = max_items.unwrap_or(state.config.max_items);
    if max_items == 0 {
        return Err(AppError::BadRequest("max_items must be at least 1".to_string()));
    }

    let base_url = base_url(headers, &state.config.bind.to_string());
    let xml = state
        .feeds
        .build_feed(&base_url, collection_url, max_items)
        .await?;

    Ok(([(header::CONTENT_TYPE, FEED_CONTENT_TYPE)], xml).into_response())
}

async fn redirect_video(
    State(state): State<AppState>,
    Path(file): Path<String>,
    Query(query): Query<MediaQuery>,
) -> AppResult<Response> {
    let video_id = video_id(&file)?;
    let height = query.height.unwrap_or(state.config.max_height);
    state.media.redirect(video_id, height).await
}

async fn stream_video(
    State(state): State<AppState>,
    Path(file): Path<String>,
    Query(query): Query<MediaQuery>,
) -> AppResult<Response> {
    let video_id = video_id(&file)?;
    let height = query.height.unwrap_or(state.config.max_height);
    state.media.stream(video_id, height).await
}

/// `<id>.mp4` or a bare `<id>`
fn video_id(file: &str) -> AppResult<&str> {
    let id = file.strip_suffix(MEDIA_SUFFIX).unwrap_or(file);
    if id.is_empty() {
        return Err(AppError::BadRequest("missing video id".to_string()));
    }
    Ok(id)
}

/// Scheme and host this server is reached at, as seen by the client
fn base_url(headers: &HeaderMap, fallback_host: &str) -> String {
    let scheme = headers
        .get(FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| matches!(*v, "http" | "https"))
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback_host);

    format!("{scheme}://{host}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::delivery::client_builder;
    use crate::gateway::tests::{StubProvider, memory_store, mp4};
    use axum::http::{HeaderValue, StatusCode};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    async fn serve(provider: Arc<StubProvider>) -> String {
        let tmp = std::env::temp_dir().join("tubecast-route-tests");
        std::fs::create_dir_all(&tmp).unwrap();
        let config = AppConfig {
            tmp_dir: tmp,
            warmup_workers: 1,
            ..AppConfig::default()
        };
        let http = client_builder().unwrap().build().unwrap();
        let state = AppState::new(config, provider, memory_store(), http);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state)).await });
        format!("http://{addr}")
    }

    fn client() -> reqwest::Client {
        client_builder()
            .unwrap()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    #[test]
    fn base_url_honours_forwarded_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(base_url(&headers, "0.0.0.0:8000"), "http://0.0.0.0:8000");

        headers.insert(header::HOST, HeaderValue::from_static("feeds.example"));
        headers.insert(FORWARDED_PROTO, HeaderValue::from_static("https, http"));
        assert_eq!(base_url(&headers, "0.0.0.0:8000"), "https://feeds.example");

        headers.insert(FORWARDED_PROTO, HeaderValue::from_static("gopher"));
        assert_eq!(base_url(&headers, "0.0.0.0:8000"), "http://feeds.example");
    }

    #[test]
    fn strips_media_suffix() {
        assert_eq!(video_id("abc.mp4").unwrap(), "abc");
        assert_eq!(video_id("abc").unwrap(), "abc");
        assert!(video_id(".mp4").is_err());
    }

    #[tokio::test]
    async fn health_check() {
        let base = serve(Arc::new(StubProvider::default())).await;
        let response = client().get(format!("{base}/healthz")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn serves_channel_feeds() {
        let provider = Arc::new(StubProvider {
            entries: 20,
            ..Default::default()
        });
        let base = serve(provider.clone()).await;

        let response = client()
            .get(format!("{base}/@chan.rss?max_items=3"))
            .header(header::ORIGIN, "https://app.example")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/xml")
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let xml = response.text().await.unwrap();
        assert_eq!(xml.matches("<item>").count(), 3);
        assert!(xml.contains(&format!("{base}/redirect/vid0.mp4")));

        // The alias form maps to the same collection and hits the cache
        client()
            .get(format!("{base}/_user/chan.rss?max_items=3"))
            .send()
            .await
            .unwrap();
        assert_eq!(provider.collection_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn serves_playlist_feeds() {
        let base = serve(Arc::new(StubProvider {
            entries: 12,
            ..Default::default()
        }))
        .await;

        let xml = client()
            .get(format!("{base}/playlist.rss?list=PL123"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(xml.matches("<item>").count(), 10);
    }

    #[tokio::test]
    async fn rejects_bad_feed_requests() {
        let base = serve(Arc::new(StubProvider::default())).await;
        let client = client();

        let status = |path: &'static str| {
            let request = client.get(format!("{base}{path}"));
            async move { request.send().await.unwrap().status() }
        };
        assert_eq!(status("/@chan.rss?max_items=0").await, StatusCode::BAD_REQUEST);
        assert_eq!(status("/@chan.rss?max_items=lots").await, StatusCode::BAD_REQUEST);
        assert_eq!(status("/playlist.rss").await, StatusCode::BAD_REQUEST);
        assert_eq!(status("/favicon.ico").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn redirects_media_requests() {
        let base = serve(Arc::new(StubProvider {
            formats: vec![mp4(480, "https://media.example/480"), mp4(720, "https://media.example/720")],
            ..Default::default()
        }))
        .await;

        let response = client()
            .get(format!("{base}/redirect/abc.mp4?height=480"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://media.example/480");
        assert!(response.headers().contains_key(header::CONTENT_DISPOSITION));
    }

    #[tokio::test]
    async fn extraction_failures_are_client_errors() {
        let base = serve(Arc::new(StubProvider {
            fail_videos: true,
            ..Default::default()
        }))
        .await;

        let response = client()
            .get(format!("{base}/video/gone.mp4"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.text().await.unwrap().contains("Video unavailable"));
    }

    #[tokio::test]
    async fn missing_rendition_is_not_found() {
        let base = serve(Arc::new(StubProvider::default())).await;
        let response = client()
            .get(format!("{base}/redirect/abc.mp4"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
