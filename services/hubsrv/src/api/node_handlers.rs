//! Node tree and history selection handlers

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use common::{AppError, StatusResponse};
use tracing::{info, warn};

use super::dto::{NodesResponse, UpdateNodeHistoryRequest, UpdateRequiredEntry};
use super::failure;
use crate::address_space::NodeId;
use crate::app_state::AppState;
use crate::reconcile::{classify, filter_by_state, ReconciliationState};

/// Stored node forest plus whether the collector config is current
///
/// @route GET /api/nodes
/// @output Json<NodesResponse> - `{nodes, telegrafUpToDate}`
/// @status 500 - Database error
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/nodes",
    responses(
        (status = 200, description = "Node forest", body = serde_json::Value),
        (status = 500, description = "Database error", body = common::ErrorResponse)
    ),
    tag = "nodes"
))]
pub async fn get_nodes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<NodesResponse>, AppError> {
    let nodes = state
        .store
        .load_hierarchy()
        .await
        .map_err(|e| failure("Failed to load nodes", e))?;
    let telegraf_up_to_date = state
        .store
        .config_up_to_date()
        .await
        .map_err(|e| failure("Failed to load nodes", e))?;

    Ok(Json(NodesResponse {
        nodes,
        telegraf_up_to_date,
    }))
}

/// Nodes whose history selection is not yet in the collector config
///
/// @route GET /api/updated-required
/// @output Json<Vec<UpdateRequiredEntry>> - Added and Removed nodes
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/updated-required",
    responses(
        (status = 200, description = "Pending changes", body = [UpdateRequiredEntry]),
        (status = 500, description = "Database error", body = common::ErrorResponse)
    ),
    tag = "nodes"
))]
pub async fn get_updated_required(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UpdateRequiredEntry>>, AppError> {
    let nodes = state
        .store
        .all_nodes()
        .await
        .map_err(|e| failure("Failed to load pending changes", e))?;
    let classified = classify(&nodes);
    let pending = filter_by_state(
        &classified,
        &[ReconciliationState::Added, ReconciliationState::Removed],
    );

    Ok(Json(
        pending.into_iter().map(UpdateRequiredEntry::from).collect(),
    ))
}

/// Enable or disable history for one node
///
/// @route POST /api/update-node-history
/// @input Json(req): UpdateNodeHistoryRequest - `{nodeID, historyEnabled, nodePath}`
/// @status 400 - Malformed body or node id
/// @status 404 - Unknown or removed node
/// @side-effects Writes `history_enabled`; the collector config changes on the next apply
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/update-node-history",
    request_body = UpdateNodeHistoryRequest,
    responses(
        (status = 200, description = "Flag updated", body = StatusResponse),
        (status = 400, description = "Invalid request", body = common::ErrorResponse),
        (status = 404, description = "Node not found", body = common::ErrorResponse)
    ),
    tag = "nodes"
))]
pub async fn update_node_history(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateNodeHistoryRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Json(req) = payload.map_err(|rejection| {
        warn!("Rejected history update body: {}", rejection.body_text());
        AppError::bad_request(rejection.body_text())
    })?;

    if let Err(e) = NodeId::parse_qualified(&req.node_id) {
        warn!("Rejected node id '{}': {}", req.node_id, e);
        return Err(AppError::bad_request(format!(
            "Invalid nodeID '{}': {}",
            req.node_id, e
        )));
    }

    state
        .store
        .set_history(&req.node_id, req.history_enabled)
        .await
        .map_err(|e| failure("Failed to update node history", e))?;

    let label = if req.node_path.is_empty() {
        &req.node_id
    } else {
        &req.node_path
    };
    let message = format!(
        "History for node {}: {}",
        label,
        if req.history_enabled {
            "Enabled"
        } else {
            "Disabled"
        }
    );
    info!("{}", message);
    Ok(Json(StatusResponse::success(message)))
}
