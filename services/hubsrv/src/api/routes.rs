//! API Route Configuration

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

#[cfg(feature = "openapi")]
use utoipa::OpenApi;

use crate::api::config_handlers::update_telegraf_config;
use crate::api::health::health_check;
use crate::api::node_handlers::{get_nodes, get_updated_required, update_node_history};
use crate::app_state::AppState;

#[cfg(feature = "openapi")]
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::health::health_check,
        crate::api::node_handlers::get_nodes,
        crate::api::node_handlers::get_updated_required,
        crate::api::node_handlers::update_node_history,
        crate::api::config_handlers::update_telegraf_config
    ),
    components(
        schemas(
            crate::api::dto::UpdateNodeHistoryRequest,
            crate::api::dto::UpdateRequiredEntry,
            common::StatusResponse,
            common::ErrorResponse
        )
    ),
    tags(
        (name = "hubsrv", description = "OPC UA history hub"),
        (name = "nodes", description = "Address-space snapshot and history selection"),
        (name = "config", description = "Telegraf config synthesis")
    )
)]
pub struct HubApiDoc;

#[cfg(feature = "openapi")]
async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    axum::Json(HubApiDoc::openapi())
}

/// Create all API routes
pub fn create_routes(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        .route("/api/nodes", get(get_nodes))
        .route("/api/updated-required", get(get_updated_required))
        .route("/api/update-node-history", post(update_node_history))
        .route("/api/update-telegraf-config", post(update_telegraf_config));

    #[cfg(feature = "openapi")]
    let router = router.route("/api/openapi.json", get(openapi_json));

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
