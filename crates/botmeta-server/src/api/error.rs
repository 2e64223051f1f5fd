//! API error types and response handling.
//!
//! Metadata queries never fail, so the only errors handlers produce are
//! rejected request parameters and lookups of devices with no cached record.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "invalid_address",
    "message": "'AA:BB' is not a Bluetooth MAC address"
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "invalid_address").
    #[schema(example = "invalid_address")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "'AA:BB' is not a Bluetooth MAC address")]
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::BadRequest {
                error_code,
                message,
            } => (StatusCode::BAD_REQUEST, error_code, message),
            Self::NotFound {
                error_code,
                message,
            } => (StatusCode::NOT_FOUND, error_code, message),
        };

        (status, Json(ErrorResponse { error, message })).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::NotFound { message, .. } => write!(f, "Not Found: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}
