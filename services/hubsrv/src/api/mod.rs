//! HTTP API
//!
//! Thin axum layer over the node store and the config applier.

pub mod config_handlers;
pub mod dto;
pub mod health;
pub mod node_handlers;
pub mod routes;

use common::{AppError, ErrorInfo};
use errors::HubErrorTrait;
use tracing::error;

use crate::error::HubSrvError;

/// Log the full cause and answer with a caller-safe envelope
///
/// Client errors keep their message; server errors only carry `context`.
pub(crate) fn failure(context: &str, err: HubSrvError) -> AppError {
    error!("{}: {}", context, err);
    let status = err.http_status();
    let message = if status.is_server_error() {
        context.to_string()
    } else {
        err.to_string()
    };
    AppError::new(status, ErrorInfo::new(message).with_code(status.as_u16()))
}
