//! # Observability
//!
//! Logging setup for Hireboard binaries. Libraries only use `tracing` macros;
//! binaries call [`init_with_config`] once at startup.
//!
//! With a `log_path`, events are written as JSONL to that file (tail it with
//! `tail -f ~/.hireboard/logs/auth.jsonl | jq`). Without one, or with
//! `also_stderr`, a compact human-readable stream goes to stderr.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "hireboard-auth".into(),
//!     default_level: "debug".into(),
//!     log_path: Some(paths.auth_log_file()),
//!     ..Default::default()
//! })?;
//! ```

mod json_layer;
mod writer;

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::AppendLogWriter;

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSON line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// JSONL output file. `None` logs to stderr only.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr when writing to a file.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with custom configuration.
///
/// Fails if the log file cannot be opened. A second call in the same process
/// leaves the first subscriber in place.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let json_layer = match &config.log_path {
        Some(path) => Some(
            JsonLayer::new(config.service_name.clone(), AppendLogWriter::open(path)?)
                .with_filter(env_filter(&config.default_level)),
        ),
        None => None,
    };

    let stderr_layer = (config.log_path.is_none() || config.also_stderr).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            service = %config.service_name,
            log_path = ?config.log_path,
            "observability initialized"
        );
    }
    Ok(())
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
