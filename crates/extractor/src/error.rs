use thiserror::Error;

/// Failures of the upstream metadata provider.
///
/// Messages are meant to be shown to clients, so they carry the provider's
/// own reason and never a local path.
#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("extractor could not be started: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("{0}")]
    Upstream(String),
    #[error("unexpected extractor output: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExtractorError>;
