//! Error handling for the hub service
//!
//! Every failure surfaces to its caller. Handlers log the full cause and
//! answer with a generic `{status: "error", message}` envelope.

use common::{AppError, ErrorInfo};
use errors::{ErrorCategory, HubError, HubErrorTrait};
use thiserror::Error;

/// Hub service error type
#[derive(Error, Debug, Clone)]
pub enum HubSrvError {
    /// Remote server unreachable (after retries at startup)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Attribute read or reference enumeration failed during a walk
    #[error("Traversal error at {node} ({attribute}): {reason}")]
    Traversal {
        node: String,
        attribute: String,
        reason: String,
    },

    /// Node store failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Collector config document could not be read, parsed or written
    #[error("Config synthesis error: {0}")]
    ConfigSynthesis(String),

    /// Malformed caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown node or resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// Process configuration problem
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for the hub service
pub type Result<T> = std::result::Result<T, HubSrvError>;

impl HubSrvError {
    pub fn connection(msg: impl Into<String>) -> Self {
        HubSrvError::Connection(msg.into())
    }

    pub fn traversal(
        node: impl Into<String>,
        attribute: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        HubSrvError::Traversal {
            node: node.into(),
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        HubSrvError::Persistence(msg.into())
    }

    pub fn config_synthesis(msg: impl Into<String>) -> Self {
        HubSrvError::ConfigSynthesis(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        HubSrvError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        HubSrvError::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        HubSrvError::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        HubSrvError::Internal(msg.into())
    }
}

impl From<sqlx::Error> for HubSrvError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => HubSrvError::NotFound("row not found".to_string()),
            other => HubSrvError::Persistence(other.to_string()),
        }
    }
}

impl From<std::io::Error> for HubSrvError {
    fn from(err: std::io::Error) -> Self {
        HubSrvError::Internal(format!("IO error: {}", err))
    }
}

impl From<HubError> for HubSrvError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Sqlite(e) => HubSrvError::from(e),
            HubError::Database(msg) => HubSrvError::Persistence(msg),
            HubError::Configuration(msg) => HubSrvError::Configuration(msg),
            HubError::InvalidConfig { field, reason } => {
                HubSrvError::Configuration(format!("{}: {}", field, reason))
            },
            HubError::Communication(msg) => HubSrvError::Connection(msg),
            HubError::Validation(msg) | HubError::BadRequest(msg) => HubSrvError::Validation(msg),
            other => HubSrvError::Internal(other.to_string()),
        }
    }
}

impl HubErrorTrait for HubSrvError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Traversal { .. } => "TRAVERSAL_ERROR",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::ConfigSynthesis(_) => "CONFIG_SYNTHESIS_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection(_) => ErrorCategory::Connection,
            Self::Traversal { .. } => ErrorCategory::Traversal,
            Self::Persistence(_) => ErrorCategory::Database,
            Self::ConfigSynthesis(_) => ErrorCategory::ConfigSynthesis,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl From<HubSrvError> for HubError {
    fn from(err: HubSrvError) -> Self {
        match err {
            HubSrvError::Connection(msg) => HubError::Communication(msg),
            HubSrvError::Traversal {
                node,
                attribute,
                reason,
            } => HubError::Protocol {
                protocol: "opcua".to_string(),
                message: format!("{} ({}): {}", node, attribute, reason),
            },
            HubSrvError::Persistence(msg) => HubError::Database(msg),
            HubSrvError::ConfigSynthesis(msg) => HubError::Internal(msg),
            HubSrvError::Validation(msg) => HubError::Validation(msg),
            HubSrvError::NotFound(resource) => HubError::NotFound { resource },
            HubSrvError::Configuration(msg) => HubError::Configuration(msg),
            HubSrvError::Internal(msg) => HubError::Internal(msg),
        }
    }
}

impl From<HubSrvError> for AppError {
    fn from(err: HubSrvError) -> Self {
        let status = err.http_status();
        let error_info = ErrorInfo::new(err.to_string())
            .with_code(status.as_u16())
            .with_details(format!(
                "error_code: {}, category: {:?}, retryable: {}",
                err.error_code(),
                err.category(),
                err.is_retryable()
            ));

        AppError::new(status, error_info)
    }
}
