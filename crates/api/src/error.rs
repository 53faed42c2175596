//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use consumer::RetryConfigError;
use read_store::{CacheError, LogError, StoreError};
use thiserror::Error;

use crate::queries::ReadError;

/// A failure while wiring the service together at startup.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store setup error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache connection error: {0}")]
    Cache(#[from] CacheError),

    #[error("Event log connection error: {0}")]
    Log(#[from] LogError),

    #[error("Invalid consumer configuration: {0}")]
    RetryConfig(#[from] RetryConfigError),
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Internal server error. The detail is logged, never returned.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<ReadError> for ApiError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ReadError::InvalidPage(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
