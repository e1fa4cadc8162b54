//! Logging initialization for Hireboard binaries.
//!
//! Wraps the observability crate. Structured JSONL goes to
//! `~/.hireboard/logs/auth.jsonl`; `RUST_LOG` overrides the level.

use crate::{CoreResult, Paths};

/// Initialize logging for the auth CLI.
///
/// * `level` - Default log level (trace, debug, info, warn, error)
/// * `also_stderr` - Mirror logs to stderr for foreground use
pub fn init_logging(paths: &Paths, level: &str, also_stderr: bool) -> CoreResult<()> {
    init_logging_for_service(paths, "hireboard-auth", level, also_stderr)
}

/// Initialize logging with a custom service name.
pub fn init_logging_for_service(
    paths: &Paths,
    service_name: &str,
    level: &str,
    also_stderr: bool,
) -> CoreResult<()> {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        log_path: Some(paths.auth_log_file()),
        also_stderr,
    })?;
    Ok(())
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("info"), tracing::Level::INFO);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("ERROR"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }
}
