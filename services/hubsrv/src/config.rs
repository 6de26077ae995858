//! Service configuration
//!
//! Loaded from compiled defaults, an optional YAML/TOML file and `HUB_`
//! environment variables (`__` separates sections), in that order.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use common::retry::RetryPolicy;
use common::service_bootstrap::LoggingSettings;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::address_space::NodeId;
use crate::error::{HubSrvError, Result};

pub const SERVICE_NAME: &str = "hubsrv";
pub const DEFAULT_PORT: u16 = 9090;
pub const ENV_PREFIX: &str = "HUB_";
/// Looked up when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "config/hubsrv.yaml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub service: ServiceSection,
    pub database: DatabaseSection,
    pub opcua: OpcUaSection,
    pub startup: StartupSection,
    pub sync: SyncSection,
    pub telegraf: TelegrafSection,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite file holding the node table
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "data/hubsrv.db".to_string(),
            max_connections: common::sqlite::DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Remote address space and the collector's connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpcUaSection {
    pub endpoint: String,
    /// Node the walk starts from
    pub root_node: String,
    /// YAML fixture served in place of a live server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_file: Option<PathBuf>,
    pub connect_timeout: String,
    pub request_timeout: String,
    pub security_policy: String,
    pub security_mode: String,
}

impl Default for OpcUaSection {
    fn default() -> Self {
        Self {
            endpoint: "opc.tcp://localhost:4840".to_string(),
            root_node: "i=85".to_string(),
            simulation_file: None,
            connect_timeout: "10s".to_string(),
            request_timeout: "5s".to_string(),
            security_policy: "None".to_string(),
            security_mode: "None".to_string(),
        }
    }
}

/// Startup connection retry (database and remote server)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupSection {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for StartupSection {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay_ms: 2000,
        }
    }
}

impl StartupSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// Periodic re-walk interval; 0 disables it
    pub resync_interval_secs: u64,
}

impl SyncSection {
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegrafSection {
    /// Telegraf TOML document rewritten on apply
    pub config_file: PathBuf,
    pub agent: AgentSettings,
    pub influx: InfluxSettings,
    pub cpu: CpuSettings,
}

impl Default for TelegrafSection {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("telegraf/telegraf.conf"),
            agent: AgentSettings::default(),
            influx: InfluxSettings::default(),
            cpu: CpuSettings::default(),
        }
    }
}

/// `[agent]` table written when the document is first created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub interval: String,
    pub round_interval: bool,
    pub metric_batch_size: i64,
    pub metric_buffer_limit: i64,
    pub collection_jitter: String,
    pub flush_interval: String,
    pub flush_jitter: String,
    pub precision: String,
    pub debug: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            interval: "10s".to_string(),
            round_interval: true,
            metric_batch_size: 1000,
            metric_buffer_limit: 10000,
            collection_jitter: "0s".to_string(),
            flush_interval: "10s".to_string(),
            flush_jitter: "0s".to_string(),
            precision: String::new(),
            debug: false,
        }
    }
}

/// `[[outputs.influxdb_v2]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxSettings {
    pub url: String,
    pub token: String,
    pub organization: String,
    pub bucket: String,
}

impl Default for InfluxSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            token: String::new(),
            organization: String::new(),
            bucket: String::new(),
        }
    }
}

/// `[[inputs.cpu]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuSettings {
    pub percpu: bool,
    pub totalcpu: bool,
    pub collect_cpu_time: bool,
    pub report_active: bool,
    pub core_tags: bool,
}

impl Default for CpuSettings {
    fn default() -> Self {
        Self {
            percpu: true,
            totalcpu: true,
            collect_cpu_time: false,
            report_active: false,
            core_tags: false,
        }
    }
}

impl HubConfig {
    /// Load configuration; falls back to [`DEFAULT_CONFIG_FILE`] when present
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        let file = match path {
            Some(p) => Some(p),
            None if default_path.exists() => Some(default_path),
            None => None,
        };

        let config: HubConfig =
            common::config_loader::load_layered(&HubConfig::default(), file, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    /// Log the settings that decide what gets walked and where it is stored
    ///
    /// Loading runs before the subscriber exists, so callers log this once
    /// logging is up.
    pub fn log_summary(&self) {
        info!(
            "Configuration loaded: endpoint={}, root={}, db={}",
            self.opcua.endpoint, self.opcua.root_node, self.database.path
        );
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.service.port == 0 {
            return Err(HubSrvError::config("service.port must be non-zero"));
        }
        if self.database.path.trim().is_empty() {
            return Err(HubSrvError::config("database.path must not be empty"));
        }
        if self.opcua.simulation_file.is_none() && self.opcua.endpoint.trim().is_empty() {
            return Err(HubSrvError::config(
                "opcua.endpoint must be set unless opcua.simulation_file is used",
            ));
        }
        NodeId::from_str(&self.opcua.root_node).map_err(|e| {
            HubSrvError::config(format!("opcua.root_node '{}': {}", self.opcua.root_node, e))
        })?;
        if self.telegraf.config_file.as_os_str().is_empty() {
            return Err(HubSrvError::config("telegraf.config_file must not be empty"));
        }
        if self.startup.max_attempts == 0 {
            return Err(HubSrvError::config("startup.max_attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.host, self.service.port)
    }
}
