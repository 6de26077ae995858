//! Health check endpoint

#![allow(clippy::disallowed_methods)] // json! macro

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use common::{AppError, SuccessResponse};
use serde_json::json;

use crate::app_state::AppState;

/// Service health, including database reachability
///
/// @route GET /health
/// @output Json<SuccessResponse<serde_json::Value>> - Service health
/// @side-effects None (read-only operation)
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health", body = serde_json::Value)
    ),
    tag = "hubsrv"
))]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<serde_json::Value>>, AppError> {
    let database = match sqlx::query("SELECT 1").execute(state.store.pool()).await {
        Ok(_) => "connected",
        Err(_) => "unavailable",
    };

    Ok(Json(SuccessResponse::new(json!({
        "status": if database == "connected" { "healthy" } else { "degraded" },
        "service": state.service_info.name,
        "version": state.service_info.version,
        "database": database,
        "telegraf_config": state.applier.document().path().display().to_string(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))))
}
