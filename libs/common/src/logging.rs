//! Logging setup for hub services
//!
//! One console layer with the bracketed level format and an optional daily
//! rolling file layer (plain or JSON). Initialization is explicit: the caller
//! owns the returned [`LogGuard`] and must keep it alive for the lifetime of
//! the process, otherwise buffered file output is lost.

use std::path::PathBuf;

use errors::{HubError, HubResult};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message fields`
///
/// Example output: `2026-03-02T00:50:44.809000Z [INFO] Walk finished nodes=42`
pub struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        // Span names give context for nested operations (walk, apply)
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}: ", span.name())?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as file prefix and default filter target
    pub service_name: String,
    /// Directory for rolling log files; `None` disables file output
    pub log_dir: Option<PathBuf>,
    /// Default level when `RUST_LOG` is not set
    pub level: Level,
    /// Emit file logs as JSON lines
    pub enable_json: bool,
    /// Colorize console output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "hubsrv".to_string(),
            log_dir: Some(PathBuf::from("logs")),
            level: Level::INFO,
            enable_json: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Filter directive used when `RUST_LOG` is absent
    pub fn default_directive(&self) -> String {
        format!(
            "{},{}={},tower_http=info,sqlx=warn",
            self.level.as_str().to_lowercase(),
            self.service_name,
            self.level.as_str().to_lowercase()
        )
    }
}

/// Keeps the non-blocking file writer alive
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Parse a level name, accepting the usual aliases
pub fn parse_level(level: &str) -> HubResult<Level> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(HubError::InvalidConfig {
            field: "logging.level".to_string(),
            reason: format!("unknown level '{}'", other),
        }),
    }
}

/// Initialize the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_with_config(config: LogConfig) -> HubResult<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let (file_layer, file_guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", config.service_name));
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = if config.enable_json {
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_current_span(true)
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .event_format(BracketedLevelFormat)
                    .boxed()
            };
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| HubError::Configuration(format!("Failed to init logging: {}", e)))?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}
