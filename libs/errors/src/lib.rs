//! Unified error handling for hub services
//!
//! Shared infrastructure errors plus the capability trait that each service's
//! own error type implements, so logging and HTTP mapping stay uniform.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ErrorInfo - API error payload
// ============================================================================

/// Error payload carried by HTTP error responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// HTTP status code
    pub code: u16,
    /// Caller-facing message
    pub message: String,
    /// Diagnostic detail for logs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 500,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

// ============================================================================
// HubError - shared infrastructure errors
// ============================================================================

#[derive(Debug, Error)]
pub enum HubError {
    // ======================================
    // Configuration
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    // ======================================
    // Storage
    // ======================================
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    // ======================================
    // Remote server
    // ======================================
    #[error("Protocol error: {protocol}: {message}")]
    Protocol { protocol: String, message: String },

    #[error("Communication error: {0}")]
    Communication(String),

    // ======================================
    // Requests
    // ======================================
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    // ======================================
    // Runtime
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HubResult<T> = Result<T, HubError>;

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl HubErrorTrait for HubError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",
            Self::Protocol { .. } => "PROTOCOL_ERROR",
            Self::Communication(_) => "COMMUNICATION_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } | Self::FileNotFound(_) => {
                ErrorCategory::Configuration
            },
            Self::Database(_) | Self::Sqlite(_) => ErrorCategory::Database,
            Self::Protocol { .. } => ErrorCategory::Protocol,
            Self::Communication(_) => ErrorCategory::Connection,
            Self::BadRequest(_) | Self::Validation(_) => ErrorCategory::Validation,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

// ============================================================================
// Hub Error Trait - Architectural layer
// ============================================================================

/// Error category, drives retry, HTTP status and log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    // Infrastructure layer
    Configuration,
    Database,

    // Request layer
    Validation,
    NotFound,

    // Remote address space layer
    Protocol,
    Connection,
    Traversal,

    // Collector configuration layer
    ConfigSynthesis,

    Internal,
}

/// Hub error capability trait
///
/// Each service keeps its own domain error type and gains a common outward
/// interface (codes, categories, HTTP status, log level) by implementing this.
pub trait HubErrorTrait: std::error::Error + Send + Sync + 'static {
    fn error_code(&self) -> &'static str;

    fn category(&self) -> ErrorCategory;

    /// Connection problems are worth another attempt
    fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Connection
    }

    #[cfg(feature = "axum-support")]
    fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Protocol | ErrorCategory::Connection | ErrorCategory::Traversal => {
                StatusCode::BAD_GATEWAY
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal
            | ErrorCategory::Database
            | ErrorCategory::ConfigSynthesis
            | ErrorCategory::Configuration => Level::ERROR,
            ErrorCategory::Validation | ErrorCategory::NotFound => Level::INFO,
            ErrorCategory::Connection | ErrorCategory::Protocol | ErrorCategory::Traversal => {
                Level::WARN
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            HubError::BadRequest("nodeID".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            HubError::NotFound {
                resource: "node ns=2;s=X".into()
            }
            .category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            HubError::FileNotFound("hubsrv.yaml".into()).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            HubError::Protocol {
                protocol: "opcua".into(),
                message: "BadNodeIdUnknown".into()
            }
            .error_code(),
            "PROTOCOL_ERROR"
        );
    }

    #[test]
    fn test_retryable_follows_category() {
        assert!(HubError::Communication("reset by peer".into()).is_retryable());
        assert!(!HubError::Validation("bad".into()).is_retryable());
        assert!(!HubError::Database("locked".into()).is_retryable());
    }

    #[test]
    fn test_error_info_omits_empty_details() {
        let info = ErrorInfo::new("Failed to load nodes").with_code(503);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["code"], 503);
        assert!(json.get("details").is_none());

        let info = info.with_details("error_code: PERSISTENCE_ERROR");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["details"], "error_code: PERSISTENCE_ERROR");
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(
            HubError::Database("x".into()).log_level(),
            tracing::Level::ERROR
        );
        assert_eq!(
            HubError::NotFound {
                resource: "x".into()
            }
            .log_level(),
            tracing::Level::INFO
        );
        assert_eq!(
            HubError::Communication("x".into()).log_level(),
            tracing::Level::WARN
        );
    }
}
