/// Configuration for the taskboard client.
/// Reads client.json from ~/.config/taskboard/client.json (or platform equivalent).
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use taskboard_core::config::ReconcileConfig;

pub const STORE_URL_ENV: &str = "TASKBOARD_STORE_URL";
pub const API_KEY_ENV: &str = "TASKBOARD_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_store_url")]
    pub store_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_board: Option<String>,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn default_store_url() -> String {
    "http://localhost:54321".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            store_url: default_store_url(),
            api_key: None,
            default_board: None,
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Apply `TASKBOARD_STORE_URL` / `TASKBOARD_API_KEY` from the environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(STORE_URL_ENV).ok(),
            std::env::var(API_KEY_ENV).ok(),
        )
    }

    fn with_overrides(mut self, store_url: Option<String>, api_key: Option<String>) -> Self {
        if let Some(url) = store_url.filter(|v| !v.trim().is_empty()) {
            self.store_url = url;
        }
        if let Some(key) = api_key.filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(key);
        }
        self
    }
}

/// Default config path: ~/.config/taskboard/client.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskboard")
        .join("client.json")
}

/// Load config from path. Returns default if the file doesn't exist.
pub fn try_load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("[taskboard.config] No config at {}, using defaults", path.display());
            return Ok(ClientConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Like [`try_load_config`], but any failure falls back to defaults.
pub fn load_config(path: &Path) -> ClientConfig {
    try_load_config(path).unwrap_or_else(|e| {
        log::warn!("[taskboard.config] {}", e);
        ClientConfig::default()
    })
}
