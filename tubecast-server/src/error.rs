use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;
use tubecast_extractor::ExtractorError;

/// Failures visible to HTTP clients.
///
/// Every message is a short human-readable reason. Local paths and error
/// chains stay in the logs.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("{0}")]
    NotFound(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Extraction(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ExtractorError> for AppError {
    fn from(error: ExtractorError) -> Self {
        match error {
            // A failed merge download happens on the delivery path
            ExtractorError::Download(message) => AppError::Delivery(message),
            ExtractorError::Io(_) => AppError::Delivery("local i/o error".to_string()),
            other => AppError::Extraction(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }
        (status, self.to_string()).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_status_codes() {
        assert_eq!(AppError::Extraction("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Delivery("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn provider_errors_keep_their_reason() {
        let error = AppError::from(ExtractorError::Upstream("Video unavailable".into()));
        assert!(matches!(error, AppError::Extraction(_)));
        assert_eq!(error.to_string(), "extraction failed: Video unavailable");

        let error = AppError::from(ExtractorError::Download("no media was written".into()));
        assert!(matches!(error, AppError::Delivery(_)));
    }

    #[test]
    fn io_errors_hide_paths() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "/var/tmp/secret.mp4");
        let error = AppError::from(ExtractorError::Io(io));
        assert!(!error.to_string().contains("/var/tmp"));
    }
}
