use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cctv_core::frame::FrameError;
use thiserror::Error;

/// Failure of an API request, rendered as `{"error": "<message>"}`.
///
/// Client errors carry their message verbatim; internal failures are
/// logged with their full cause and reported generically.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No image part")]
    NoImagePart,
    #[error("No selected file")]
    NoSelectedFile,
    #[error("Invalid file format")]
    InvalidFileFormat,
    #[error("Failed to decode image")]
    Decode(#[source] FrameError),
    #[error("{}", .0.body_text())]
    Form(#[from] MultipartRejection),
    #[error("{}", .0.body_text())]
    Upload(#[from] MultipartError),
    #[error("Failed to retrieve status")]
    Status(#[source] std::io::Error),
    #[error("Processing failed")]
    Processing(#[from] anyhow::Error),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoImagePart
            | ApiError::NoSelectedFile
            | ApiError::InvalidFileFormat
            | ApiError::Decode(_) => StatusCode::BAD_REQUEST,
            ApiError::Form(e) => e.status(),
            ApiError::Upload(e) => e.status(),
            ApiError::Status(_) | ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ApiError::Processing(e) => tracing::error!(error = ?e, "error processing image"),
            ApiError::Status(e) => tracing::error!(error = %e, "error in status"),
            ApiError::Decode(e) => tracing::error!(error = %e, "failed to decode image"),
            other => tracing::error!(error = %other, "rejected upload"),
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NoImagePart.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Decode(FrameError::Empty).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Processing(anyhow::anyhow!("disk full")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_cause_is_not_exposed() {
        let err = ApiError::Processing(anyhow::anyhow!("/secret/path: permission denied"));
        assert_eq!(err.to_string(), "Processing failed");
    }
}
