//! Application state shared across all API handlers

use std::sync::Arc;

use common::service_bootstrap::ServiceInfo;

use crate::apply::ConfigApplier;
use crate::config::HubConfig;
use crate::node_store::NodeStore;

pub struct AppState {
    pub config: Arc<HubConfig>,
    pub store: NodeStore,
    /// Serializes config applies
    pub applier: Arc<ConfigApplier>,
    pub service_info: ServiceInfo,
}

impl AppState {
    pub fn new(
        config: Arc<HubConfig>,
        store: NodeStore,
        applier: Arc<ConfigApplier>,
        service_info: ServiceInfo,
    ) -> Self {
        Self {
            config,
            store,
            applier,
            service_info,
        }
    }
}
