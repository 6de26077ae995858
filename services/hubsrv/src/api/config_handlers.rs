//! Collector config handlers

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use common::{AppError, StatusResponse};

use super::failure;
use crate::app_state::AppState;

/// Rewrite the Telegraf config from the current history selection
///
/// @route POST /api/update-telegraf-config
/// @output Json<StatusResponse> - success envelope
/// @status 500 - Document or database failure; flags are left unchanged
/// @side-effects Replaces the Telegraf config file, then marks Added nodes
///               as included and Removed nodes as excluded
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/update-telegraf-config",
    responses(
        (status = 200, description = "Config rewritten", body = StatusResponse),
        (status = 500, description = "Config update failed", body = common::ErrorResponse)
    ),
    tag = "config"
))]
pub async fn update_telegraf_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, AppError> {
    state
        .applier
        .apply()
        .await
        .map_err(|e| failure("Failed to update config file", e))?;

    Ok(Json(StatusResponse::success(
        "Config file updated with history nodes",
    )))
}
