//! Request and response bodies of the HTTP API
//!
//! Field names follow what the web client already sends and reads.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::node_store::NodeTree;
use crate::reconcile::{ClassifiedNode, ReconciliationState};

/// Body of `GET /api/nodes`
#[derive(Debug, Clone, Serialize)]
pub struct NodesResponse {
    pub nodes: Vec<NodeTree>,
    #[serde(rename = "telegrafUpToDate")]
    pub telegraf_up_to_date: bool,
}

/// Entry of `GET /api/updated-required`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequiredEntry {
    #[serde(rename = "nodeID")]
    pub node_id: String,
    pub browse_name: String,
    /// "Added" or "Removed"
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub db_action_required: ReconciliationState,
}

impl From<&ClassifiedNode> for UpdateRequiredEntry {
    fn from(c: &ClassifiedNode) -> Self {
        Self {
            node_id: c.node.node_id.clone(),
            browse_name: c.node.browse_name.clone(),
            db_action_required: c.state,
        }
    }
}

/// Body of `POST /api/update-node-history`
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct UpdateNodeHistoryRequest {
    #[serde(rename = "nodeID")]
    pub node_id: String,
    pub history_enabled: bool,
    /// Only used in the response message
    #[serde(default)]
    pub node_path: String,
}
