//! Service bootstrap utilities
//!
//! Startup banner, logging settings shared by service configs, and the
//! logging initialization every binary calls first.

use std::path::PathBuf;

use errors::HubResult;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::logging::{self, LogConfig, LogGuard};

/// Service metadata for startup
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Service name (e.g., "hubsrv")
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    /// Service description
    pub description: String,
    /// Default port
    pub default_port: u16,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
        default_port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            default_port,
        }
    }
}

/// Logging section embedded in service configuration files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log directory; empty string disables file output
    pub dir: String,
    /// Default level when `RUST_LOG` is unset
    pub level: String,
    /// JSON lines in the log file
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Print the startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
 ██╗  ██╗██╗   ██╗██████╗ ███████╗██████╗ ██╗   ██╗
 ██║  ██║██║   ██║██╔══██╗██╔════╝██╔══██╗██║   ██║
 ███████║██║   ██║██████╔╝███████╗██████╔╝██║   ██║
 ██╔══██║██║   ██║██╔══██╗╚════██║██╔══██╗╚██╗ ██╔╝
 ██║  ██║╚██████╔╝██████╔╝███████║██║  ██║ ╚████╔╝
 ╚═╝  ╚═╝ ╚═════╝ ╚═════╝ ╚══════╝╚═╝  ╚═╝  ╚═══╝
    "#;

    info!("{}", banner);
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!(" Default Port: {}", service.default_port);
}

/// Initialize logging for a service
///
/// `level_override` (usually from the command line) wins over the configured level.
pub fn init_logging(
    service: &ServiceInfo,
    settings: &LoggingSettings,
    level_override: Option<&str>,
    ansi: bool,
) -> HubResult<LogGuard> {
    let level = logging::parse_level(level_override.unwrap_or(&settings.level))?;
    let log_dir = if settings.dir.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(&settings.dir).join(&service.name))
    };

    logging::init_with_config(LogConfig {
        service_name: service.name.clone(),
        log_dir,
        level,
        enable_json: settings.json,
        ansi,
    })
}
