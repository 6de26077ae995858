//! Service Bootstrap and Initialization
//!
//! Command-line arguments, logging, store and collector-config setup used by
//! `main` before the API server starts.

use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use common::logging::LogGuard;
use common::service_bootstrap::ServiceInfo;
use common::sqlite::SqliteClient;
use tracing::{info, warn};

use crate::address_space::simulated::SimulatedAddressSpace;
use crate::address_space::NodeId;
use crate::apply::ConfigApplier;
use crate::config::{HubConfig, DEFAULT_PORT, SERVICE_NAME};
use crate::error::{HubSrvError, Result};
use crate::node_store::NodeStore;
use crate::sync::connect_with_retry;
use crate::telegraf::{OpcUaInputSettings, TelegrafDocument};

/// Command-line arguments for hubsrv
#[derive(Parser, Clone, Debug)]
#[command(
    name = "hubsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "OPC UA history hub",
    long_about = None
)]
pub struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides logging.level
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Bind address for API server; overrides service.host/port
    #[arg(short = 'b', long)]
    pub bind_address: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

pub fn create_service_info() -> ServiceInfo {
    ServiceInfo::new(
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        "OPC UA Time-Series Hub - History Selection & Telegraf Config",
        DEFAULT_PORT,
    )
}

/// Initialize logging; the returned guard must live until exit
pub fn initialize_logging(
    args: &Args,
    config: &HubConfig,
    service_info: &ServiceInfo,
) -> Result<LogGuard> {
    common::service_bootstrap::init_logging(
        service_info,
        &config.logging,
        args.log_level.as_deref(),
        !args.no_color,
    )
    .map_err(|e| HubSrvError::config(format!("Failed to initialize logging: {}", e)))
}

/// Command-line address wins over the configured host and port
pub fn determine_bind_address(cli: Option<&str>, config: &HubConfig) -> String {
    match cli {
        Some(addr) if !addr.trim().is_empty() => addr.to_string(),
        _ => config.bind_address(),
    }
}

/// Open the node store with bounded retry and ensure its schema
pub async fn open_store(config: &HubConfig) -> Result<NodeStore> {
    let policy = config.startup.retry_policy();
    let path = config.database.path.clone();
    let max_connections = config.database.max_connections;

    let client = connect_with_retry(&policy, &format!("sqlite:{}", path), || {
        let path = path.clone();
        async move {
            SqliteClient::new(&path, max_connections)
                .await
                .map_err(HubSrvError::from)
        }
    })
    .await?;

    NodeStore::new(client.pool().clone()).await
}

/// Make sure the Telegraf document exists and matches the applied set
pub async fn prepare_telegraf(config: &HubConfig, store: NodeStore) -> Result<Arc<ConfigApplier>> {
    let document = TelegrafDocument::new(&config.telegraf.config_file);
    document.bootstrap(&config.telegraf).await?;

    let applier = Arc::new(ConfigApplier::new(
        store,
        document,
        OpcUaInputSettings::from(&config.opcua),
    ));
    applier.restore_applied().await?;
    Ok(applier)
}

/// Checks run by `--validate`: config values, simulation fixture and Telegraf document
pub async fn validate_configuration(config: &HubConfig) -> Result<()> {
    config.validate()?;
    let root = NodeId::from_str(&config.opcua.root_node)
        .map_err(|e| HubSrvError::config(format!("opcua.root_node: {}", e)))?;
    info!("Root node: {}", root);

    if let Some(fixture) = &config.opcua.simulation_file {
        SimulatedAddressSpace::from_yaml_file(fixture)?;
        info!("Simulation fixture OK: {}", fixture.display());
    }

    let document = TelegrafDocument::new(&config.telegraf.config_file);
    if tokio::fs::try_exists(document.path()).await.unwrap_or(false) {
        document.read_table().await?;
        info!("Telegraf config OK: {}", document.path().display());
    } else {
        warn!(
            "Telegraf config {} does not exist yet; it will be created on startup",
            document.path().display()
        );
    }
    Ok(())
}
