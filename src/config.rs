//! Configuration management with YAML support

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::sync::ScheduleConfig;
use crate::upstream::DEFAULT_BASE_URL;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Metering service access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Empty or "false" disables the proxy
    #[serde(default)]
    pub proxy_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Scheduling and backfill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// First day fetched by `backfill`
    #[serde(default = "default_start_date")]
    pub start_date: String,

    /// Local wall-clock time of the daily run, "HH:MM"
    #[serde(default = "default_sync_time")]
    pub sync_time: String,

    #[serde(default = "default_enabled")]
    pub sync_on_start: bool,
}

// Default value functions
fn default_database_path() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("wakasync").join("wakatime.db"))
        .map(|path| path.to_string_lossy().to_string())
        .unwrap_or_else(|| "wakatime.db".to_string())
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_start_date() -> String {
    "2016-01-01".to_string()
}

fn default_sync_time() -> String {
    "01:00".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            proxy_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_date: default_start_date(),
            sync_time: default_sync_time(),
            sync_on_start: true,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, then apply environment overrides
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./wakasync.yaml (current directory)
    /// 3. ~/.config/wakasync/wakasync.yaml
    pub fn load(path: &str) -> Result<Self> {
        let mut config = Config::default();
        for search_path in &search_paths(path) {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)
                    .with_context(|| format!("Failed to read config {}", search_path))?;
                config = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse config {}", search_path))?;
                break;
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override settings from `lookup` (the process environment in `load`).
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("DATABASE_PATH") {
            self.database.path = v;
        }
        if let Some(v) = get("WAKATIME_API_KEY") {
            self.upstream.api_key = v;
        }
        if let Some(v) = get("WAKATIME_BASE_URL") {
            self.upstream.base_url = v;
        }
        if let Some(v) = get("PROXY_URL") {
            self.upstream.proxy_url = Some(v);
        }
        if let Some(v) = get("START_DATE") {
            self.sync.start_date = v;
        }
        if let Some(v) = get("SYNC_TIME") {
            self.sync.sync_time = v;
        }
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database.path).to_string();
        PathBuf::from(expanded)
    }

    pub fn start_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.sync.start_date, "%Y-%m-%d")
            .with_context(|| format!("Invalid start_date '{}'", self.sync.start_date))
    }

    pub fn schedule(&self) -> Result<ScheduleConfig> {
        let sync_time = NaiveTime::parse_from_str(&self.sync.sync_time, "%H:%M")
            .with_context(|| format!("Invalid sync_time '{}', expected HH:MM", self.sync.sync_time))?;
        Ok(ScheduleConfig {
            sync_time,
            sync_on_start: self.sync.sync_on_start,
        })
    }
}

// The CLI default is also a fixed entry, so each path is kept once
fn search_paths(path: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for candidate in [path, "wakasync.yaml", "~/.config/wakasync/wakasync.yaml"] {
        let expanded = shellexpand::tilde(candidate).to_string();
        if !paths.contains(&expanded) {
            paths.push(expanded);
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.upstream.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.upstream.timeout_secs, 30);
        assert!(config.sync.sync_on_start);
        assert_eq!(
            config.start_date().unwrap(),
            NaiveDate::from_ymd_opt(2016, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
database:
  path: ~/.local/share/wakasync/test.db

upstream:
  api_key: waka_123
  proxy_url: "false"
  timeout_secs: 10

sync:
  sync_time: "03:30"
  sync_on_start: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.path, "~/.local/share/wakasync/test.db");
        assert_eq!(config.upstream.api_key, "waka_123");
        assert_eq!(config.upstream.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.upstream.timeout_secs, 10);
        assert_eq!(config.sync.start_date, "2016-01-01");

        let schedule = config.schedule().unwrap();
        assert_eq!(schedule.sync_time, NaiveTime::from_hms_opt(3, 30, 0).unwrap());
        assert!(!schedule.sync_on_start);
    }

    #[test]
    fn test_environment_overrides_file_values() {
        let mut config = Config::default();
        let env: HashMap<&str, &str> = [
            ("WAKATIME_API_KEY", "from-env"),
            ("START_DATE", "2020-02-02"),
            ("PROXY_URL", ""),
        ]
        .into_iter()
        .collect();

        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.upstream.api_key, "from-env");
        assert_eq!(config.sync.start_date, "2020-02-02");
        assert_eq!(config.upstream.proxy_url, None);
    }

    #[test]
    fn test_search_paths_skip_duplicates() {
        let default = search_paths("wakasync.yaml");
        assert_eq!(default.len(), 2);
        assert_eq!(default[0], "wakasync.yaml");

        let home = search_paths("~/.config/wakasync/wakasync.yaml");
        assert_eq!(home.len(), 2);
        assert_eq!(home[1], "wakasync.yaml");

        let custom = search_paths("/etc/wakasync.yaml");
        assert_eq!(custom.len(), 3);
        assert_eq!(custom[0], "/etc/wakasync.yaml");
    }

    #[test]
    fn test_invalid_sync_time_is_rejected() {
        let mut config = Config::default();
        config.sync.sync_time = "25:99".to_string();
        assert!(config.schedule().is_err());
    }
}
