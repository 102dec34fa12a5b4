//! [`MetadataProvider`] backed by the `yt-dlp` program.
//!
//! Each call runs one child process. Children are killed when the awaiting
//! future is dropped, so an abandoned request does not leave work behind.

mod info;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ExtractorError, Result};
use crate::media::{CollectionMetadata, VideoMetadata};
use crate::provider::MetadataProvider;
use info::InfoJson;

// Longest provider message passed on to clients
const MAX_MESSAGE_LEN: usize = 300;

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments added to every invocation, e.g. `--cookies <file>`
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["--quiet", "--no-warnings", "--no-progress"])
            .args(&self.extra_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn dump_json(&self, mut command: Command, url: &str) -> Result<InfoJson> {
        command.arg("--dump-single-json").arg("--").arg(url);
        debug!(url, "Running extractor");

        let output = command.output().await.map_err(ExtractorError::Spawn)?;
        if !output.status.success() {
            let message = failure_message(&output.stderr, output.status.code());
            warn!(url, status = ?output.status.code(), %message, "Extraction failed");
            return Err(ExtractorError::Upstream(message));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// The provider's own reason for a failure, as short as possible
fn failure_message(stderr: &[u8], code: Option<i32>) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let line = stderr
        .lines()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()));

    let message = match line {
        Some(line) => line.trim_start_matches("ERROR:").trim().to_string(),
        None => match code {
            Some(code) => format!("extractor exited with status {code}"),
            None => "extractor was terminated".to_string(),
        },
    };

    match message.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message,
    }
}

#[async_trait]
impl MetadataProvider for YtDlp {
    async fn extract_collection(&self, url: &str, max_items: usize) -> Result<CollectionMetadata> {
        let mut command = self.command();
        command
            .arg("--flat-playlist")
            .arg("--playlist-end")
            .arg(max_items.max(1).to_string());

        let info = self.dump_json(command, url).await?;
        Ok(info.into_collection())
    }

    async fn extract_video(&self, url: &str) -> Result<VideoMetadata> {
        let mut command = self.command();
        command.arg("--no-playlist");

        let info = self.dump_json(command, url).await?;
        let fallback_id = url.rsplit("v=").next().unwrap_or(url);
        Ok(info.into_video(fallback_id))
    }

    async fn download_merged(&self, url: &str, max_height: u32, dest: &Path) -> Result<()> {
        let mut command = self.command();
        command
            .arg("--no-playlist")
            .arg("--force-overwrites")
            .arg("--no-part")
            .arg("-f")
            .arg(format!("bestvideo[height<={max_height}]+bestaudio/best"))
            .arg("--merge-output-format")
            .arg("mp4")
            .arg("-o")
            .arg(dest)
            .arg("--")
            .arg(url)
            .stdout(Stdio::null());
        debug!(url, max_height, "Running merged download");

        let output = command.output().await.map_err(ExtractorError::Spawn)?;
        if !output.status.success() {
            let message = failure_message(&output.stderr, output.status.code());
            return Err(ExtractorError::Download(message));
        }

        let written = tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(ExtractorError::Download("no media was written".to_string()));
        }

        Ok(())
    }
}
