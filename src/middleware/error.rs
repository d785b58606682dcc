//! Error response formatting
//!
//! Every error leaves the service with the same JSON shape; `msg` is always present
//! because the gateway and the web client both read it.

use crate::error::{AppError, ErrorCode};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub msg: String,

    /// Machine-readable error code
    pub error: ErrorCode,

    /// Request ID for debugging and support
    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    /// Whether the client should retry the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    /// Create a new error response from an AppError
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            msg: error.user_message(),
            error: error.error_code(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: Some(error.is_retryable()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = ?self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = ?self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        let error_response = ErrorResponse::from_app_error(&self);
        (status_code, Json(error_response)).into_response()
    }
}

/// Helper to extract request ID from request headers
pub fn get_request_id_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
