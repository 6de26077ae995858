//! Shared API models for hub services
//!
//! Every mutating endpoint answers with a `{status, message}` envelope, and
//! every failure is rendered through [`AppError`] with the same shape so the
//! web client only has to understand one format.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

pub use errors::ErrorInfo;

/// Status value carried by successful envelopes
pub const STATUS_SUCCESS: &str = "success";
/// Status value carried by error envelopes
pub const STATUS_ERROR: &str = "error";

// ============================================================================
// Standard API Response Models
// ============================================================================

/// `{status, message}` envelope returned by operator actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct StatusResponse {
    /// "success" or "error"
    pub status: String,
    /// Human readable outcome
    pub message: String,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// `{status, data}` envelope for read endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct SuccessResponse<T> {
    /// Always "success"
    pub status: String,
    /// Response data
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            data,
        }
    }
}

/// Error envelope: the `{status, message}` shape plus the numeric code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorResponse {
    /// Always "error"
    pub status: String,
    /// Generic, caller-safe message
    pub message: String,
    /// HTTP status code
    pub code: u16,
}

impl From<ErrorInfo> for ErrorResponse {
    fn from(info: ErrorInfo) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: info.message,
            code: info.code,
        }
    }
}

// ============================================================================
// AppError - HTTP Error with proper status codes (requires axum feature)
// ============================================================================

#[cfg(feature = "axum")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

/// Application error with HTTP status code
/// This type implements IntoResponse for seamless integration with axum handlers
#[cfg(feature = "axum")]
#[derive(Debug, Clone)]
pub struct AppError {
    /// HTTP status code
    pub status: StatusCode,
    /// Error information
    pub error: ErrorInfo,
}

#[cfg(feature = "axum")]
impl AppError {
    /// Create a new error
    pub fn new(status: StatusCode, error: ErrorInfo) -> Self {
        Self { status, error }
    }

    /// 400 with the given message rendered to the caller
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, message)
    }

    fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ErrorInfo::new(message).with_code(status.as_u16()),
        }
    }
}

#[cfg(feature = "axum")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::from(self.error))).into_response()
    }
}
