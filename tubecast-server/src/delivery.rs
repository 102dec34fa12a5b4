//! # Media Delivery
//!
//! Serves one video either as a redirect to its direct media URL or as a
//! byte stream. Streams never hold more than one chunk in memory:
//!
//! - a combined MP4 rendition is relayed straight from upstream
//! - anything else is downloaded and merged by the provider into a
//!   temporary file, which is streamed back and deleted once the response
//!   body is finished or dropped

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::Context as _;
use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, stream};
use reqwest::Client;
use rustls::ClientConfig;
use rustls::crypto::aws_lc_rs;
use rustls_platform_verifier::BuilderVerifierExt;
use tempfile::TempDir;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use tubecast_extractor::{FormatDescriptor, VideoMetadata, youtube};

use crate::error::{AppError, AppResult};
use crate::gateway::ExtractionGateway;

/// Size of every chunk sent to the client except the last
pub const CHUNK_SIZE: usize = 256 * 1024;

const MAX_FILENAME_CHARS: usize = 200;
const DOWNLOAD_NAME: &str = "media.mp4";
const HAZARDOUS_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

type ChunkStream<E> = Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>;

/// Client builder for upstream relays, TLS configured
pub fn client_builder() -> anyhow::Result<reqwest::ClientBuilder> {
    let provider = Arc::new(aws_lc_rs::default_provider());

    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("configuring TLS protocol versions")?
        .with_platform_verifier()
        .context("loading platform certificate verifier")?
        .with_no_client_auth();

    Ok(Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(concat!("tubecast/", env!("CARGO_PKG_VERSION")))
        .use_preconfigured_tls(tls_config)
        .redirect(reqwest::redirect::Policy::limited(10)))
}

/// Create the HTTP client used for upstream relays
pub fn create_client() -> anyhow::Result<Client> {
    client_builder()?.build().context("building HTTP client")
}

#[derive(Clone)]
pub struct MediaDelivery {
    gateway: ExtractionGateway,
    http: Client,
    tmp_dir: PathBuf,
}

impl MediaDelivery {
    pub fn new(gateway: ExtractionGateway, http: Client, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            gateway,
            http,
            tmp_dir: tmp_dir.into(),
        }
    }

    /// `302` to the direct URL of the best combined rendition.
    ///
    /// The `Content-Disposition` header is kept even though clients following
    /// a redirect generally ignore it.
    pub async fn redirect(&self, video_id: &str, max_height: u32) -> AppResult<Response> {
        let video = self.gateway.resolve_video(video_id).await?;
        let (format, url) = video
            .best_combined(max_height)
            .and_then(|f| f.url.as_deref().map(|url| (f, url)))
            .ok_or_else(|| AppError::NotFound("no playable MP4 source found".to_string()))?;
        debug!(video_id, %format, "Redirecting");

        let location = HeaderValue::from_str(url)
            .map_err(|_| AppError::Delivery("upstream URL is not a valid header".to_string()))?;

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::FOUND;
        let headers = response.headers_mut();
        headers.insert(header::LOCATION, location);
        headers.insert(header::CONTENT_DISPOSITION, content_disposition(&video));
        Ok(response)
    }

    /// `200` with the video as an MP4 body
    pub async fn stream(&self, video_id: &str, max_height: u32) -> AppResult<Response> {
        let video = self.gateway.resolve_video(video_id).await?;

        let direct = video
            .best_combined(max_height)
            .filter(|f| f.is_mp4())
            .and_then(|f| f.url.as_deref().map(|url| (f, url)));

        let (body, length) = match direct {
            Some((format, url)) => self.relay(video_id, format, url).await?,
            None => self.download(video_id, max_height).await?,
        };

        let mut response = Response::new(body);
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
        headers.insert(header::CONTENT_DISPOSITION, content_disposition(&video));
        if let Some(length) = length {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        }
        Ok(response)
    }

    async fn relay(
        &self,
        video_id: &str,
        format: &FormatDescriptor,
        url: &str,
    ) -> AppResult<(Body, Option<u64>)> {
        info!(video_id, %format, "Relaying upstream media");

        let response = self.http.get(url).send().await.map_err(|e| {
            warn!(video_id, error = %e, "Upstream request failed");
            AppError::Delivery("upstream request failed".to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(video_id, %status, "Upstream refused media request");
            return Err(AppError::Delivery(format!("upstream returned {status}")));
        }

        let length = response.content_length();
        // Dropping the body drops the stream, which closes the upstream connection
        let chunks = rechunk(response.bytes_stream().boxed(), CHUNK_SIZE);
        Ok((Body::from_stream(chunks), length))
    }

    async fn download(&self, video_id: &str, max_height: u32) -> AppResult<(Body, Option<u64>)> {
        info!(video_id, max_height, "No direct MP4 rendition, downloading");

        // One directory per download, so the provider's intermediate files
        // go away with the merged one
        let workdir = tempfile::Builder::new()
            .prefix("tubecast_")
            .tempdir_in(&self.tmp_dir)
            .map_err(|e| {
                warn!(dir = ?self.tmp_dir, error = %e, "Cannot create temporary directory");
                AppError::Delivery("could not reserve temporary storage".to_string())
            })?;
        let path = workdir.path().join(DOWNLOAD_NAME);

        let url = youtube::video_url(video_id);
        let downloaded = self
            .gateway
            .provider()
            .download_merged(&url, max_height, &path)
            .await;

        if let Err(e) = downloaded {
            let message = scrub_path(&e.to_string(), &path);
            warn!(video_id, error = %e, "Merged download failed");
            remove_temp(workdir);
            return Err(AppError::Delivery(message));
        }

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(video_id, error = %e, "Cannot open downloaded file");
                remove_temp(workdir);
                return Err(AppError::Delivery("downloaded file is unreadable".to_string()));
            }
        };
        let length = file.metadata().await.ok().map(|m| m.len());

        let chunks = rechunk(ReaderStream::with_capacity(file, CHUNK_SIZE).boxed(), CHUNK_SIZE);
        Ok((Body::from_stream(TempFileStream::new(chunks, workdir)), length))
    }
}

fn remove_temp(workdir: TempDir) {
    if let Err(e) = workdir.close() {
        warn!(error = %e, "Failed to remove temporary directory");
    }
}

/// Replace the temporary file's location in a provider message
fn scrub_path(message: &str, path: &Path) -> String {
    let message = message.replace(&path.display().to_string(), "<temporary file>");
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            message.replace(&dir.display().to_string(), "<temporary dir>")
        }
        _ => message,
    }
}

/// Regroup a byte stream into chunks of exactly `chunk_size` bytes, the
/// last one excepted. An error ends the stream.
fn rechunk<E: Send + 'static>(inner: ChunkStream<E>, chunk_size: usize) -> ChunkStream<E> {
    stream::unfold(
        (inner, BytesMut::with_capacity(chunk_size), false),
        move |(mut inner, mut buf, mut done)| async move {
            loop {
                if buf.len() >= chunk_size {
                    let chunk = buf.split_to(chunk_size).freeze();
                    return Some((Ok(chunk), (inner, buf, done)));
                }
                if done {
                    if buf.is_empty() {
                        return None;
                    }
                    let chunk = buf.split().freeze();
                    return Some((Ok(chunk), (inner, buf, done)));
                }
                match inner.next().await {
                    Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), (inner, BytesMut::new(), true))),
                    None => done = true,
                }
            }
        },
    )
    .boxed()
}

/// Streams a downloaded file and deletes its directory when finished or
/// dropped
struct TempFileStream {
    inner: ChunkStream<std::io::Error>,
    guard: Option<TempDir>,
}

impl TempFileStream {
    fn new(inner: ChunkStream<std::io::Error>, workdir: TempDir) -> Self {
        Self {
            inner,
            guard: Some(workdir),
        }
    }
}

impl Stream for TempFileStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let next = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = next {
            if let Some(workdir) = self.guard.take() {
                remove_temp(workdir);
            }
        }
        next
    }
}

/// File name suggested for a video title: hazardous characters removed,
/// whitespace collapsed, at most 200 characters
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !HAZARDOUS_CHARS.contains(c) && !c.is_control())
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// `attachment` disposition with an ASCII name and an RFC 6266 UTF-8 name
fn content_disposition(video: &VideoMetadata) -> HeaderValue {
    let mut name = sanitize_filename(video.title.as_deref().unwrap_or_default());
    if name.is_empty() {
        name = sanitize_filename(&video.id);
    }

    let ascii: String = name
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    let value = format!(
        "attachment; filename=\"{ascii}.mp4\"; filename*=UTF-8''{}.mp4",
        percent_encode(&name)
    );

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => out.push(byte as char),
            b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
