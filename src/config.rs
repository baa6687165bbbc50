//! Configuration management for the server.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::MAX_SCAN_PERIOD;
use crate::websocket::DEFAULT_QUEUE_CAPACITY;

/// Main configuration for the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for storing data
    pub data_dir: PathBuf,

    /// Path to SQLite database
    pub db_path: PathBuf,

    /// Path to config directory
    pub config_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Address the HTTP server binds to
    pub http_host: String,

    /// HTTP port for the API and websocket endpoint
    pub http_port: u16,

    /// Seconds between maintenance scans
    pub scheduler_interval_secs: u64,

    /// Outbound messages buffered per client before it is dropped
    pub client_queue_capacity: usize,

    /// Commands buffered for the hub dispatch loop
    pub hub_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| home.join(".local/share"))
            .join("asset-sentinel");
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| home.join(".config"))
            .join("asset-sentinel");

        Self {
            db_path: data_dir.join("asset-sentinel.db"),
            config_dir,
            data_dir,
            log_level: "info".to_string(),
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            scheduler_interval_secs: 3600,
            client_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            hub_channel_capacity: 1024,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        Config::default().config_dir.join("config.json")
    }

    /// Load from `path` if given, else from the default location if it exists,
    /// else defaults. Environment overrides are applied last.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Config::load(path)?,
            None => {
                let default_path = Config::default_path();
                if default_path.exists() {
                    Config::load(&default_path)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `PORT`, `DB_PATH`, `SCHEDULER_INTERVAL_SECS` and `LOG_LEVEL` overrides.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = var("PORT") {
            self.http_port = port
                .parse()
                .with_context(|| format!("invalid PORT: {}", port))?;
        }
        if let Some(db_path) = var("DB_PATH") {
            self.db_path = PathBuf::from(db_path);
        }
        if let Some(secs) = var("SCHEDULER_INTERVAL_SECS") {
            self.scheduler_interval_secs = secs
                .parse()
                .with_context(|| format!("invalid SCHEDULER_INTERVAL_SECS: {}", secs))?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Scan period, clamped to between one second and [`MAX_SCAN_PERIOD`].
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(
            self.scheduler_interval_secs
                .clamp(1, MAX_SCAN_PERIOD.as_secs()),
        )
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Ensure all directories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.config_dir)?;
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.http_port = 9100;
        config.scheduler_interval_secs = 60;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.http_port, 9100);
        assert_eq!(loaded.scheduler_interval_secs, 60);
        assert_eq!(loaded.client_queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"http_port": 7000}"#).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.http_port, 7000);
        assert_eq!(loaded.hub_channel_capacity, 1024);
        assert_eq!(loaded.log_level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "9999"),
            ("DB_PATH", "/tmp/other.db"),
            ("SCHEDULER_INTERVAL_SECS", "5"),
            ("LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.http_port, 9999);
        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.scheduler_interval(), Duration::from_secs(5));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == "PORT").then(|| "http".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = Config {
            scheduler_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.scheduler_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_interval_is_clamped() {
        let config = Config {
            scheduler_interval_secs: u64::MAX,
            ..Config::default()
        };
        assert_eq!(config.scheduler_interval(), MAX_SCAN_PERIOD);
    }
}
