use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failures surfaced to clients of `/classify`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Model not loaded")]
    ModelUnavailable,
    #[error("No file part")]
    MissingFilePart,
    #[error("No selected file")]
    EmptyFilename,
    #[error("Malformed upload")]
    MalformedUpload,
    #[error("Error during image classification")]
    Classification,
    /// Anything unexpected. The detail is logged but never sent to the client.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFilePart | ApiError::EmptyFilename | ApiError::MalformedUpload => {
                StatusCode::BAD_REQUEST
            }
            ApiError::ModelUnavailable | ApiError::Classification | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("classify request failed: {}", self);
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
