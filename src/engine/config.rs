//! Updater Configuration Module
//! Handles loading and validating updater.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::engine::platform::Platform;

/// File looked up by [`UpdaterConfig::load_from_dir`]
pub const CONFIG_FILE_NAME: &str = "updater.config.json";

/// Comma-separated list of manifest URLs replacing the configured ones
pub const UPDATE_URL_ENV: &str = "OGFORGE_UPDATE_URL";

pub const DEFAULT_MANIFEST_URLS: [&str; 2] = [
    "https://shnakeio.github.io/ogforge/download/version.json",
    "https://forge-iye0.onrender.com/version.json",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdaterConfig {
    /// Manifest sources, tried in order
    pub manifest_urls: Vec<String>,
    pub timeout_ms: u64,
    /// Install right after a download completes
    pub auto_install: bool,
    pub auto_install_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,
    pub app_name: String,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            manifest_urls: DEFAULT_MANIFEST_URLS.iter().map(|s| s.to_string()).collect(),
            timeout_ms: 9_000,
            auto_install: true,
            auto_install_delay_ms: 2_500,
            download_dir: None,
            app_name: "OGforge".to_string(),
        }
    }
}

impl UpdaterConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: UpdaterConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load `updater.config.json` from `dir`, falling back to defaults when
    /// the file does not exist
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        match Self::load(&dir.join(CONFIG_FILE_NAME)) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `OGFORGE_UPDATE_URL` from the process environment
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(UPDATE_URL_ENV) {
            self.apply_url_override(&value);
        }
        self
    }

    /// Replace the manifest sources with a comma-separated list.
    ///
    /// Entries are trimmed and empty ones dropped; a value with no entries
    /// keeps the current sources.
    pub fn apply_url_override(&mut self, value: &str) {
        let urls: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if !urls.is_empty() {
            self.manifest_urls = urls;
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn auto_install_delay(&self) -> Duration {
        Duration::from_millis(self.auto_install_delay_ms)
    }

    /// Where downloaded artifacts are stored
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(|| Platform::current().update_cache_dir(&self.app_name))
            .unwrap_or_else(|| std::env::temp_dir().join(&self.app_name).join("updates"))
    }

    /// User-Agent sent with every update request
    pub fn user_agent(&self, version: &str) -> String {
        format!("{}/{} (updater)", self.app_name, version)
    }
}
