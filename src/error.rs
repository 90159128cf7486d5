//! Common error types for the dispatch gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Your current image must finish generating before you can request another one")]
    AlreadyGenerating,

    #[error("You may submit again in {remaining_secs} seconds")]
    CooldownActive {
        retry_at: DateTime<Utc>,
        remaining_secs: i64,
    },

    #[error("Invalid request: {0}")]
    ValidationFailed(String),

    #[error("The job queue is full, try again shortly")]
    QueueFull,

    #[error("The generation service is unreachable: {0}")]
    DownstreamUnreachable(String),

    #[error("The generation service returned HTTP {status}: {detail}")]
    DownstreamError { status: u16, detail: String },

    #[error("The generation service returned an unreadable response: {0}")]
    DownstreamMalformed(String),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Job {0} has not finished yet")]
    ResultNotReady(Uuid),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response format
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Json(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                Some("invalid_json"),
            ),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "downstream_error", None),
            AppError::AlreadyGenerating => (
                StatusCode::CONFLICT,
                "admission_error",
                Some("already_generating"),
            ),
            AppError::CooldownActive { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "admission_error",
                Some("cooldown_active"),
            ),
            AppError::ValidationFailed(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error", None)
            }
            AppError::QueueFull => (
                StatusCode::SERVICE_UNAVAILABLE,
                "admission_error",
                Some("queue_full"),
            ),
            AppError::DownstreamUnreachable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "downstream_error",
                Some("downstream_unreachable"),
            ),
            AppError::DownstreamError { .. } => {
                (StatusCode::BAD_GATEWAY, "downstream_error", None)
            }
            AppError::DownstreamMalformed(_) => (
                StatusCode::BAD_GATEWAY,
                "downstream_error",
                Some("malformed_response"),
            ),
            AppError::JobNotFound(_) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                Some("job_not_found"),
            ),
            AppError::ResultNotReady(_) => (
                StatusCode::CONFLICT,
                "not_found_error",
                Some("result_not_ready"),
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error", None),
            AppError::AuthenticationFailed(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                Some("invalid_api_key"),
            ),
            AppError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                Some("rate_limit_exceeded"),
            ),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
        };

        let retry_at = match &self {
            AppError::CooldownActive { retry_at, .. } => Some(*retry_at),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
                retry_at,
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
