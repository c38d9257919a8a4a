//! Global CLI configuration
//!
//! Stores the default API token and API URL in ~/.hookwire/config.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:3001";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the home directory")]
    NoHomeDir,

    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persisted CLI settings
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Default bearer token for API calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Default API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl ClientConfig {
    /// Flag or environment value first, then the stored value, then the default
    pub fn api_url_or(&self, flag: Option<String>) -> String {
        flag.filter(|url| !url.is_empty())
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn token_or(&self, flag: Option<String>) -> Option<String> {
        flag.filter(|token| !token.is_empty())
            .or_else(|| self.auth_token.clone())
    }
}

/// Reads and writes the config file
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// Manager for ~/.hookwire/config.json
    pub fn new() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::at(home.join(".hookwire").join("config.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, or the default when no file exists yet
    pub fn load(&self) -> Result<ClientConfig, ConfigError> {
        if !self.path.exists() {
            return Ok(ClientConfig::default());
        }

        let json = fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, config: &ClientConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, json).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn set_token(&self, token: String) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.auth_token = Some(token);
        self.save(&config)
    }

    pub fn clear_token(&self) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.auth_token = None;
        self.save(&config)
    }

    pub fn set_api_url(&self, url: String) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_url = Some(url);
        self.save(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, ConfigManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::at(dir.path().join("nested").join("config.json"));
        (dir, manager)
    }

    #[test]
    fn test_missing_file_is_default() {
        let (_dir, manager) = manager();
        assert_eq!(manager.load().unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_token_roundtrip_creates_directory() {
        let (_dir, manager) = manager();

        manager.set_token("tok_1".to_string()).unwrap();
        manager
            .set_api_url("https://hooks.example.com".to_string())
            .unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.auth_token.as_deref(), Some("tok_1"));
        assert_eq!(loaded.api_url.as_deref(), Some("https://hooks.example.com"));

        manager.clear_token().unwrap();
        let loaded = manager.load().unwrap();
        assert!(loaded.auth_token.is_none());
        assert_eq!(loaded.api_url.as_deref(), Some("https://hooks.example.com"));
    }

    #[test]
    fn test_corrupt_file_reports_path() {
        let (_dir, manager) = manager();
        fs::create_dir_all(manager.path().parent().unwrap()).unwrap();
        fs::write(manager.path(), "{ not json").unwrap();

        let err = manager.load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_flags_override_stored_values() {
        let stored = ClientConfig {
            auth_token: Some("stored".to_string()),
            api_url: Some("https://stored.example.com".to_string()),
        };

        assert_eq!(stored.token_or(Some("flag".to_string())).as_deref(), Some("flag"));
        assert_eq!(stored.token_or(None).as_deref(), Some("stored"));
        assert_eq!(stored.token_or(Some(String::new())).as_deref(), Some("stored"));
        assert_eq!(stored.api_url_or(None), "https://stored.example.com");
        assert_eq!(ClientConfig::default().api_url_or(None), DEFAULT_API_URL);
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ClientConfig {
            auth_token: Some("secret-token".to_string()),
            api_url: None,
        };
        assert!(!format!("{:?}", config).contains("secret-token"));
    }
}
