//! Client configuration management.
//!
//! This module handles loading and saving the client configuration,
//! which includes the server address, API prefix, request timeout and the
//! last used username.
//!
//! Configuration is stored at `~/.config/plainpage/config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "plainpage";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// All API routes are mounted below this prefix by the server
const DEFAULT_API_PREFIX: &str = "/_api";

/// HTTP request timeout in seconds. Also bounds the token refresh call.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub api_prefix: String,
    pub request_timeout_secs: u64,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted session
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Base URL every API path is appended to, e.g. `http://localhost:8080/_api`
    pub fn api_base_url(&self) -> String {
        let server = self.server_url.trim_end_matches('/');
        let prefix = self.api_prefix.trim_matches('/');
        if prefix.is_empty() {
            server.to_string()
        } else {
            format!("{}/{}", server, prefix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base_url_joins_prefix() {
        let config = Config {
            server_url: "https://wiki.example.org/".to_string(),
            ..Config::default()
        };
        assert_eq!(config.api_base_url(), "https://wiki.example.org/_api");
    }

    #[test]
    fn test_api_base_url_without_prefix() {
        let config = Config {
            server_url: "http://127.0.0.1:1234".to_string(),
            api_prefix: "/".to_string(),
            ..Config::default()
        };
        assert_eq!(config.api_base_url(), "http://127.0.0.1:1234");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"last_username":"alice"}"#)
            .expect("Failed to parse partial config");
        assert_eq!(config.server_url, "http://localhost:8080");
        assert_eq!(config.api_prefix, "/_api");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.last_username.as_deref(), Some("alice"));
    }
}
