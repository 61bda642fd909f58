//! Configuration management for keeper.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default backend URL (can be overridden at compile time via KEEPER_API_URL env var).
pub const DEFAULT_API_URL: &str = match option_env!("KEEPER_API_URL") {
    Some(url) => url,
    None => "http://localhost:8000/api",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_IDLE_TIMEOUT_MINUTES: u64 = 15;
const DEFAULT_IDLE_TICK_SECONDS: u64 = 1;
const DEFAULT_IDLE_WARNING_MARGIN_MINUTES: u64 = 1;

/// Inactivity policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleSettings {
    /// Minutes without interaction before the session is terminated.
    #[serde(default = "default_idle_timeout_minutes")]
    pub timeout_minutes: u64,
    /// Tick granularity of the idle counter, in seconds.
    #[serde(default = "default_idle_tick_seconds")]
    pub tick_seconds: u64,
    /// Minutes before expiry at which the user is warned.
    #[serde(default = "default_idle_warning_margin_minutes")]
    pub warning_margin_minutes: u64,
}

fn default_idle_timeout_minutes() -> u64 {
    DEFAULT_IDLE_TIMEOUT_MINUTES
}

fn default_idle_tick_seconds() -> u64 {
    DEFAULT_IDLE_TICK_SECONDS
}

fn default_idle_warning_margin_minutes() -> u64 {
    DEFAULT_IDLE_WARNING_MARGIN_MINUTES
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            timeout_minutes: DEFAULT_IDLE_TIMEOUT_MINUTES,
            tick_seconds: DEFAULT_IDLE_TICK_SECONDS,
            warning_margin_minutes: DEFAULT_IDLE_WARNING_MARGIN_MINUTES,
        }
    }
}

fn minutes(value: u64, name: &str) -> CoreResult<Duration> {
    value
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| CoreError::Config(format!("{} of {} minutes is out of range", name, value)))
}

impl IdleSettings {
    pub fn timeout(&self) -> CoreResult<Duration> {
        minutes(self.timeout_minutes, "idle timeout")
    }

    pub fn warning_margin(&self) -> CoreResult<Duration> {
        minutes(self.warning_margin_minutes, "warning margin")
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }

    /// Reject settings the idle monitor cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        self.timeout()?;
        self.warning_margin()?;
        if self.timeout_minutes == 0 {
            return Err(CoreError::Config(
                "idle timeout must be at least one minute".to_string(),
            ));
        }
        if self.tick_seconds == 0 {
            return Err(CoreError::Config(
                "idle tick must be at least one second".to_string(),
            ));
        }
        if self.warning_margin_minutes >= self.timeout_minutes {
            return Err(CoreError::Config(format!(
                "warning margin ({} min) must be shorter than the idle timeout ({} min)",
                self.warning_margin_minutes, self.timeout_minutes
            )));
        }
        Ok(())
    }
}

/// Main keeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Backend base URL; `/login`, `/refresh` and `/me` are resolved against it.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Inactivity policy.
    #[serde(default)]
    pub idle: IdleSettings,
    /// Where the token and role are persisted. Defaults to `Paths::session_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            idle: IdleSettings::default(),
            session_file: None,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file (if present), then apply
    /// environment overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.idle.validate()?;
        config.api_url()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from `KEEPER_*` environment variables.
    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(log_level) = get("KEEPER_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(api_url) = get("KEEPER_API_URL") {
            self.api_url = api_url.trim().to_string();
        }
        if let Some(minutes) = get("KEEPER_IDLE_TIMEOUT_MINUTES").and_then(parse_u64) {
            self.idle.timeout_minutes = minutes;
        }
        if let Some(seconds) = get("KEEPER_IDLE_TICK_SECONDS").and_then(parse_u64) {
            self.idle.tick_seconds = seconds;
        }
        if let Some(minutes) = get("KEEPER_IDLE_WARNING_MARGIN_MINUTES").and_then(parse_u64) {
            self.idle.warning_margin_minutes = minutes;
        }
    }

    /// Get the backend URL as a parsed URL.
    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_url).map_err(CoreError::from)
    }

    /// Resolve the persisted session file.
    pub fn session_file(&self, paths: &Paths) -> PathBuf {
        self.session_file
            .clone()
            .unwrap_or_else(|| paths.session_file())
    }
}

fn parse_u64(raw: String) -> Option<u64> {
    raw.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.idle.timeout_minutes, 15);
        assert_eq!(config.idle.tick_seconds, 1);
        assert_eq!(config.idle.warning_margin_minutes, 1);
        assert!(config.session_file.is_none());
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "api_url": "https://reports.example.com/api",
            "idle": { "timeout_minutes": 30 }
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.api_url, "https://reports.example.com/api");
        assert_eq!(config.idle.timeout_minutes, 30);
        assert_eq!(config.idle.tick_seconds, 1);
        assert_eq!(config.idle.warning_margin_minutes, 1);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.idle.timeout_minutes = 20;
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.idle.timeout_minutes, 20);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("KEEPER_LOG_LEVEL", "debug"),
            ("KEEPER_API_URL", " https://other.example.com/api "),
            ("KEEPER_IDLE_TIMEOUT_MINUTES", "5"),
            ("KEEPER_IDLE_TICK_SECONDS", "60"),
            ("KEEPER_IDLE_WARNING_MARGIN_MINUTES", "not-a-number"),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api_url, "https://other.example.com/api");
        assert_eq!(config.idle.timeout_minutes, 5);
        assert_eq!(config.idle.tick_seconds, 60);
        assert_eq!(config.idle.warning_margin_minutes, 1);
    }

    #[test]
    fn test_idle_settings_validation() {
        assert!(IdleSettings::default().validate().is_ok());

        let zero_tick = IdleSettings {
            tick_seconds: 0,
            ..Default::default()
        };
        assert!(zero_tick.validate().is_err());

        let margin_too_large = IdleSettings {
            timeout_minutes: 1,
            warning_margin_minutes: 1,
            ..Default::default()
        };
        assert!(margin_too_large.validate().is_err());
    }

    #[test]
    fn test_idle_minutes_out_of_range() {
        let huge_timeout = IdleSettings {
            timeout_minutes: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(huge_timeout.timeout(), Err(CoreError::Config(_))));
        assert!(matches!(huge_timeout.validate(), Err(CoreError::Config(_))));

        let settings = IdleSettings::default();
        assert_eq!(settings.timeout().unwrap(), Duration::from_secs(15 * 60));
        assert_eq!(settings.warning_margin().unwrap(), Duration::from_secs(60));
        assert_eq!(settings.tick(), Duration::from_secs(1));
    }

    #[test]
    fn test_session_file_defaults_to_paths() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::default();
        assert_eq!(config.session_file(&paths), paths.session_file());

        let custom = Config {
            session_file: Some(dir.path().join("custom.json")),
            ..Default::default()
        };
        assert_eq!(custom.session_file(&paths), dir.path().join("custom.json"));
    }
}
