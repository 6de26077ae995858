//! Shared fixtures for hubsrv integration tests

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use common::sqlite::SqliteClient;
use hubsrv::address_space::simulated::SimulatedAddressSpace;
use hubsrv::api::routes::create_routes;
use hubsrv::app_state::AppState;
use hubsrv::apply::ConfigApplier;
use hubsrv::bootstrap::create_service_info;
use hubsrv::config::HubConfig;
use hubsrv::node_store::NodeStore;
use hubsrv::reconcile::{classify, ReconciliationState};
use hubsrv::sync::SyncOrchestrator;
use hubsrv::telegraf::{OpcUaInputSettings, TelegrafDocument};
use hubsrv::NodeId;

pub const DEVICE_FIXTURE: &str = include_str!("../../fixtures/device.yaml");
pub const DEVICE: &str = "ns=2;s=Device";
pub const TEMP: &str = "ns=2;s=Device.Temp";
pub const PRESSURE: &str = "ns=2;s=Device.Pressure";

pub struct TestHub {
    /// Holds the database and Telegraf document
    pub dir: TempDir,
    pub config: Arc<HubConfig>,
    pub store: NodeStore,
    pub applier: Arc<ConfigApplier>,
    pub orchestrator: SyncOrchestrator,
}

pub fn device_space() -> SimulatedAddressSpace {
    SimulatedAddressSpace::from_yaml_str(DEVICE_FIXTURE).unwrap()
}

/// Store, Telegraf document and applier in a temp dir, nothing walked yet
pub async fn empty_hub() -> TestHub {
    let dir = tempfile::tempdir().unwrap();
    let mut config = HubConfig::default();
    config.database.path = dir.path().join("hubsrv.db").display().to_string();
    config.opcua.endpoint = "opc.tcp://plc:4840".to_string();
    config.opcua.root_node = DEVICE.to_string();
    config.telegraf.config_file = dir.path().join("telegraf.conf");
    let config = Arc::new(config);

    let client = SqliteClient::new(&config.database.path, 2).await.unwrap();
    let store = NodeStore::new(client.pool().clone()).await.unwrap();

    let document = TelegrafDocument::new(&config.telegraf.config_file);
    document.bootstrap(&config.telegraf).await.unwrap();
    let applier = Arc::new(ConfigApplier::new(
        store.clone(),
        document,
        OpcUaInputSettings::from(&config.opcua),
    ));

    let root: NodeId = DEVICE.parse().unwrap();
    let orchestrator = SyncOrchestrator::new(store.clone(), root);

    TestHub {
        dir,
        config,
        store,
        applier,
        orchestrator,
    }
}

/// Hub with the device fixture already walked into the store
pub async fn device_hub() -> TestHub {
    let hub = empty_hub().await;
    hub.orchestrator.sync_once(&device_space()).await.unwrap();
    hub
}

impl TestHub {
    pub fn router(&self) -> Router {
        create_routes(Arc::new(AppState::new(
            Arc::clone(&self.config),
            self.store.clone(),
            Arc::clone(&self.applier),
            create_service_info(),
        )))
    }

    pub async fn state_of(&self, node_id: &str) -> ReconciliationState {
        let nodes = self.store.all_nodes().await.unwrap();
        classify(&nodes)
            .into_iter()
            .find(|c| c.node.node_id == node_id)
            .map(|c| c.state)
            .unwrap()
    }

    /// `name` of every node listed in the opcua input
    pub async fn telegraf_node_names(&self) -> Vec<String> {
        let table = self.applier.document().read_table().await.unwrap();
        let Some(stanzas) = table
            .get("inputs")
            .and_then(|i| i.get("opcua"))
            .and_then(|o| o.as_array())
        else {
            return Vec::new();
        };
        assert_eq!(stanzas.len(), 1, "exactly one opcua input expected");
        stanzas[0]["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["name"].as_str().unwrap().to_string())
            .collect()
    }
}

pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
    send(
        router,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

pub async fn post_json(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        router,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}
