//! Hub basic library
//!
//! Provides functionality shared by hub services:
//! - logging setup and the bracketed console format
//! - layered configuration loading
//! - SQLite client
//! - bounded retry for startup connections
//! - API response envelopes and the HTTP error type

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub mod api_types;
pub mod config_loader;
pub mod logging;
pub mod retry;
pub mod service_bootstrap;
pub mod shutdown;

// Re-export commonly used API types
pub use api_types::{ErrorInfo, ErrorResponse, StatusResponse, SuccessResponse};

// Re-export AppError when axum feature is enabled
#[cfg(feature = "axum")]
pub use api_types::AppError;

pub use retry::{retry_with_policy, RetryExhausted, RetryPolicy};

// Re-export common dependencies
pub use serde;
pub use serde_json;
pub use tokio;
