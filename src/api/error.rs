//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use crate::backend::BackendError;

/// API error type with automatic response conversion.
/// None of these responses touch credential cookies.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    BadGateway(String),
    /// Backend status relayed verbatim.
    Upstream(StatusCode, String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::BadGateway(msg.into())
    }

    /// Map a backend failure, logging the detail.
    pub fn backend(context: &str, e: BackendError) -> Self {
        match e {
            BackendError::Transport(msg) => {
                error!(error = %msg, "{}: backend unreachable", context);
                Self::BadGateway("Backend unavailable".into())
            }
            BackendError::Decode(msg) => {
                error!(error = %msg, "{}: invalid backend response", context);
                Self::BadGateway("Invalid backend response".into())
            }
            BackendError::Rejected { status: 403, message } => {
                warn!(message = %message, "{}: forbidden", context);
                Self::Forbidden(message)
            }
            BackendError::Rejected { message, .. } => {
                warn!(message = %message, "{}: unauthorized", context);
                Self::Unauthorized(message)
            }
            BackendError::Status { status, message } => {
                warn!(status, message = %message, "{}: backend error", context);
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                Self::Upstream(status, message)
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Upstream(status, msg) => (status, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Parse an optional JSON object body. An empty body yields `None`.
pub fn parse_optional_json<T: serde::de::DeserializeOwned>(
    body: &[u8],
) -> Result<Option<T>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::bad_request(format!("Malformed request body: {}", e)))
}
