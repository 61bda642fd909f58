//! Logging initialization for keeper binaries.
//!
//! Thin wrapper over the observability crate: stderr output for interactive
//! use, plus an optional JSONL file under `~/.keeper/logs`.

use observability::LogConfig;
use std::path::PathBuf;

/// Initialize the logging system.
///
/// # Arguments
///
/// * `service_name` - Name written into every JSONL line
/// * `level` - Default log level (trace, debug, info, warn, error); `RUST_LOG` wins
/// * `log_file` - Optional JSONL file
///
/// # Example
///
/// ```ignore
/// init_logging("keeper-cli", "warn", None);
/// tracing::info!("ready");
/// ```
pub fn init_logging(service_name: &str, level: &str, log_file: Option<PathBuf>) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path: log_file,
        also_stderr: true,
    });
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
        assert_eq!(parse_level("warn"), tracing::Level::WARN);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("error"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_case_insensitive() {
        assert_eq!(parse_level("Debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("WARNING"), tracing::Level::WARN);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }
}
