//! OPC UA Time-Series Hub (`hubsrv`)
//!
//! Walks the configured address space into SQLite at startup, then serves
//! the history-selection API until a shutdown signal arrives.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::serve;
use clap::Parser;
use common::shutdown::join_background;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use errors::HubResult;
use hubsrv::{
    address_space::NodeId,
    api::routes::create_routes,
    app_state::AppState,
    bootstrap::{self, Args},
    config::HubConfig,
    error::HubSrvError,
    sync::{connect_address_space, warn_if_empty, SyncOrchestrator},
};

#[tokio::main]
async fn main() -> HubResult<()> {
    let args = Args::parse();
    let service_info = bootstrap::create_service_info();

    let config = HubConfig::load(args.config.as_deref())?;
    let _log_guard = bootstrap::initialize_logging(&args, &config, &service_info)?;
    config.log_summary();
    if !args.no_color {
        common::service_bootstrap::print_startup_banner(&service_info);
    }

    // Validation mode: validate and exit
    if args.validate {
        bootstrap::validate_configuration(&config).await?;
        info!("Validation completed successfully");
        return Ok(());
    }

    let config = Arc::new(config);
    let root = NodeId::from_str(&config.opcua.root_node)
        .map_err(|e| HubSrvError::config(format!("opcua.root_node: {}", e)))?;

    // ============ Phase 1: node store and collector config ============
    let store = bootstrap::open_store(&config).await?;
    let applier = bootstrap::prepare_telegraf(&config, store.clone()).await?;

    // ============ Phase 2: initial walk ============
    let policy = config.startup.retry_policy();
    let space = connect_address_space(&config.opcua, &policy).await?;
    let orchestrator = Arc::new(SyncOrchestrator::new(store.clone(), root));
    let report = orchestrator.sync_once(space.as_ref()).await?;
    warn_if_empty(&report, orchestrator.root());

    let shutdown_token = CancellationToken::new();
    let signal_handle = common::shutdown::cancel_on_shutdown(shutdown_token.clone());

    let resync_handle = config.sync.resync_interval().map(|interval| {
        info!("Periodic re-walk every {:?}", interval);
        Arc::clone(&orchestrator).spawn_periodic(
            Arc::clone(&space),
            interval,
            shutdown_token.clone(),
        )
    });

    // ============ Phase 3: API server ============
    let state = Arc::new(AppState::new(
        Arc::clone(&config),
        store.clone(),
        applier,
        service_info,
    ));
    let app = create_routes(state);

    let bind_address = bootstrap::determine_bind_address(args.bind_address.as_deref(), &config);
    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        HubSrvError::config(format!("Invalid bind address '{}': {}", bind_address, e))
    })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| HubSrvError::connection(format!("Failed to bind to {}: {}", addr, e)))?;

    info!("API server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let server_token = shutdown_token.clone();
    let shutdown = async move { server_token.cancelled().await };
    if let Err(e) = serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!("Server error: {}", e);
    }

    // Server may also stop on its own; make sure background tasks follow
    shutdown_token.cancel();
    if let Some(handle) = resync_handle {
        join_background("Periodic sync", handle).await;
    }
    join_background("Shutdown signal", signal_handle).await;
    store.pool().close().await;

    info!("hubsrv stopped");
    Ok(())
}
