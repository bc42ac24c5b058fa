//! Application error types and HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Boxed error used to keep an underlying cause attached to a failure kind.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error model used throughout request parsing, validation, and inference.
///
/// Input faults map to 4xx responses and are reported before any engine
/// work; collaborator faults keep their cause and map to 5xx.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    InvalidRequest {
        message: String,
        param: Option<String>,
        code: Option<String>,
    },
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    BadMultipart(String),
    #[error("transcription failed: {source}")]
    Transcription {
        #[source]
        source: BoxError,
    },
    #[error("diarization failed: {source}")]
    Diarization {
        #[source]
        source: BoxError,
    },
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Creates a `404 Not Found` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates an `invalid_request_error` payload with status `400`.
    pub fn invalid_request(
        message: impl Into<String>,
        param: Option<&str>,
        code: Option<&str>,
    ) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            param: param.map(ToOwned::to_owned),
            code: code.map(ToOwned::to_owned),
        }
    }

    /// Creates a `415 Unsupported Media Type` style error.
    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(message.into())
    }

    /// Creates a multipart parsing/shape validation error.
    pub fn bad_multipart(message: impl Into<String>) -> Self {
        Self::BadMultipart(message.into())
    }

    /// Wraps a transcription engine failure, keeping the cause.
    pub fn transcription(source: impl Into<BoxError>) -> Self {
        Self::Transcription {
            source: source.into(),
        }
    }

    /// Wraps a diarization engine failure, keeping the cause.
    pub fn diarization(source: impl Into<BoxError>) -> Self {
        Self::Diarization {
            source: source.into(),
        }
    }

    /// Creates a generic internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, payload) = match self {
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorPayload {
                    error: ErrorBody {
                        message,
                        error_type: "invalid_request_error".to_string(),
                        param: Some("file_path".to_string()),
                        code: Some("file_not_found".to_string()),
                    },
                },
            ),
            AppError::InvalidRequest {
                message,
                param,
                code,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorPayload {
                    error: ErrorBody {
                        message,
                        error_type: "invalid_request_error".to_string(),
                        param,
                        code,
                    },
                },
            ),
            AppError::UnsupportedMediaType(message) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorPayload {
                    error: ErrorBody {
                        message,
                        error_type: "invalid_request_error".to_string(),
                        param: Some("file".to_string()),
                        code: Some("unsupported_media_type".to_string()),
                    },
                },
            ),
            AppError::BadMultipart(message) => (
                StatusCode::BAD_REQUEST,
                ErrorPayload {
                    error: ErrorBody {
                        message,
                        error_type: "invalid_request_error".to_string(),
                        param: Some("file".to_string()),
                        code: Some("invalid_multipart".to_string()),
                    },
                },
            ),
            AppError::Transcription { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorPayload {
                    error: ErrorBody {
                        message: format!("transcription failed: {source}"),
                        error_type: "server_error".to_string(),
                        param: None,
                        code: Some("transcription_failed".to_string()),
                    },
                },
            ),
            AppError::Diarization { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorPayload {
                    error: ErrorBody {
                        message: format!("diarization failed: {source}"),
                        error_type: "server_error".to_string(),
                        param: None,
                        code: Some("diarization_failed".to_string()),
                    },
                },
            ),
            AppError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorPayload {
                    error: ErrorBody {
                        message,
                        error_type: "server_error".to_string(),
                        param: None,
                        code: Some("internal_error".to_string()),
                    },
                },
            ),
        };

        (status, Json(payload)).into_response()
    }
}
