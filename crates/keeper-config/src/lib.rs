//! Configuration, paths, and logging setup for keeper.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, IdleSettings, DEFAULT_API_URL, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
