//! # Observability
//!
//! Centralized tracing setup for the keeper workspace.
//!
//! Crates in the workspace only emit events through the standard `tracing`
//! macros. The binary calls [`init`] or [`init_with_config`] once at startup
//! and decides where the events go:
//!
//! - a compact human-readable stream on stderr, and/or
//! - a JSONL file (one object per line) that can be tailed with
//!   `tail -f ~/.keeper/logs/keeper.jsonl | jq`.
//!
//! Session tokens travel through almost every code path of a session manager,
//! so the JSONL layer redacts credential-bearing fields and bearer/JWT-shaped
//! values before anything reaches disk.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init("keeper");
//!     tracing::info!("service started");
//! }
//! ```

mod file;
mod json_layer;
mod redact;

use std::path::PathBuf;

pub use file::CentralLogWriter;
pub use json_layer::{JsonLayer, LogLine};
pub use redact::{redact_value, REDACTED};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "keeper", "keeper-cli").
    /// Included in every JSONL line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional JSONL log file. No file layer is installed when absent.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize the observability layer with default settings.
///
/// Logs go to stderr only.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// Calling this more than once is harmless: the second global subscriber
/// install fails and is ignored.
pub fn init_with_config(config: LogConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let env_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let json_layer = config.log_path.as_ref().and_then(|path| {
        match CentralLogWriter::new(path) {
            Ok(writer) => Some(
                JsonLayer::new(config.service_name.clone(), file::WriterFactory::new(writer))
                    .with_filter(env_filter()),
            ),
            Err(err) => {
                eprintln!("failed to open log file {}: {}", path.display(), err);
                None
            }
        }
    });

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        if let Some(path) = &config.log_path {
            tracing::debug!(log_path = %path.display(), "observability initialized");
        }
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
