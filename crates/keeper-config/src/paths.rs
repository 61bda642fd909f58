//! File system paths for keeper.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths for keeper.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for keeper state (~/.keeper)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.keeper`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".keeper"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.keeper).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.keeper/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the persisted session file (~/.keeper/session.json).
    pub fn session_file(&self) -> PathBuf {
        self.base_dir.join("session.json")
    }

    /// Get the logs directory (~/.keeper/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file (~/.keeper/logs/keeper.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("keeper.jsonl")
    }

    /// Ensure the base and logs directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
