//! HTTP API driven through the router with `oneshot`

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use support::{device_hub, empty_hub, get_json, post_json, send, DEVICE, PRESSURE, TEMP};

#[tokio::test]
async fn test_health() {
    let hub = empty_hub().await;
    let (status, body) = get_json(hub.router(), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["service"], "hubsrv");
    assert_eq!(body["data"]["database"], "connected");
}

#[tokio::test]
async fn test_nodes_tree_shape() {
    let hub = device_hub().await;
    let (status, body) = get_json(hub.router(), "/api/nodes").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["telegrafUpToDate"], true);

    let nodes = body["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    let device = &nodes[0];
    assert_eq!(device["NodeID"], DEVICE);
    assert_eq!(device["ParentID"], DEVICE);
    assert_eq!(device["BrowseName"], "Device");
    assert_eq!(device["NodeClass"], "NodeClassObject");
    assert_eq!(device["DBActionRequired"], "History Disabled No Change");

    let children = device["Children"].as_array().unwrap();
    let ids: Vec<&str> = children
        .iter()
        .map(|c| c["NodeID"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&TEMP));
    assert!(ids.contains(&PRESSURE));
    assert!(children
        .iter()
        .all(|c| c["Children"].as_array().unwrap().is_empty()));
}

#[tokio::test]
async fn test_history_update_flow() {
    let hub = device_hub().await;

    let (status, body) = post_json(
        hub.router(),
        "/api/update-node-history",
        json!({"nodeID": TEMP, "historyEnabled": true, "nodePath": "Device.Temp"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "History for node Device.Temp: Enabled");

    let (_, body) = get_json(hub.router(), "/api/nodes").await;
    assert_eq!(body["telegrafUpToDate"], false);

    let (status, body) = get_json(hub.router(), "/api/updated-required").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{"nodeID": TEMP, "browseName": "Temp", "dbActionRequired": "Added"}])
    );

    let (status, body) = post_json(hub.router(), "/api/update-telegraf-config", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Config file updated with history nodes");
    assert_eq!(hub.telegraf_node_names().await, vec!["Temp".to_string()]);

    let (_, body) = get_json(hub.router(), "/api/updated-required").await;
    assert_eq!(body, json!([]));
    let (_, body) = get_json(hub.router(), "/api/nodes").await;
    assert_eq!(body["telegrafUpToDate"], true);
}

#[tokio::test]
async fn test_history_message_falls_back_to_node_id() {
    let hub = device_hub().await;
    let (status, body) = post_json(
        hub.router(),
        "/api/update-node-history",
        json!({"nodeID": PRESSURE, "historyEnabled": false}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        format!("History for node {}: Disabled", PRESSURE)
    );
}

#[tokio::test]
async fn test_malformed_history_body_is_rejected() {
    let hub = device_hub().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/update-node-history")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(hub.router(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    // Wrong type for historyEnabled
    let (status, _) = post_json(
        hub.router(),
        "/api/update-node-history",
        json!({"nodeID": TEMP, "historyEnabled": "yes"}),
    )
    .await;
    assert!(status.is_client_error());

    let (status, body) = post_json(
        hub.router(),
        "/api/update-node-history",
        json!({"nodeID": "Device.Temp", "historyEnabled": true}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Device.Temp"));

    // Namespace given, identifier type still missing
    let (status, _) = post_json(
        hub.router(),
        "/api/update-node-history",
        json!({"nodeID": "ns=2;Device.Temp", "historyEnabled": true}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing changed
    let temp = hub.store.get(TEMP).await.unwrap().unwrap();
    assert!(!temp.history_enabled);
}

#[tokio::test]
async fn test_unknown_node_is_not_found() {
    let hub = device_hub().await;
    let (status, body) = post_json(
        hub.router(),
        "/api/update-node-history",
        json!({"nodeID": "ns=2;s=Device.Missing", "historyEnabled": true}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_removed_node_cannot_be_enabled() {
    let hub = device_hub().await;
    hub.store.mark_removed(PRESSURE).await.unwrap();

    let (status, _) = post_json(
        hub.router(),
        "/api/update-node-history",
        json!({"nodeID": PRESSURE, "historyEnabled": true}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_config_update_failure_keeps_flags() {
    let hub = device_hub().await;
    hub.store.set_history(TEMP, true).await.unwrap();

    // An unparsable document makes synthesis fail
    tokio::fs::write(hub.applier.document().path(), "[agent\n")
        .await
        .unwrap();

    let (status, body) = post_json(hub.router(), "/api/update-telegraf-config", json!({})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Failed to update config file");

    let temp = hub.store.get(TEMP).await.unwrap().unwrap();
    assert!(temp.history_enabled);
    assert!(!temp.included_in_config);
}

#[tokio::test]
async fn test_unknown_route() {
    let hub = empty_hub().await;
    let (status, _) = get_json(hub.router(), "/api/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[cfg(feature = "openapi")]
#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let hub = empty_hub().await;
    let (status, body) = get_json(hub.router(), "/api/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().unwrap();
    for path in [
        "/health",
        "/api/nodes",
        "/api/updated-required",
        "/api/update-node-history",
        "/api/update-telegraf-config",
    ] {
        assert!(paths.contains_key(path), "missing {}", path);
    }
}
