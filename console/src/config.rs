use serde::{Deserialize, Serialize};
use shared::SearchSettings;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::settings::{self, SettingsError};

pub const CONFIG_PATH_ENV: &str = "SEARCH_CONSOLE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid search defaults: {0}")]
    Settings(#[from] SettingsError),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DresConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl Default for DresConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub backend_url: String,
    pub request_timeout_secs: u64,
    pub dres: DresConfig,
    pub search: SearchSettings,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 30,
            dres: DresConfig::default(),
            search: SearchSettings::default(),
        }
    }
}

impl ConsoleConfig {
    /// Loads from `SEARCH_CONSOLE_CONFIG` or `config/console.yaml`, then
    /// applies environment overrides. A missing file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/console.yaml"));

        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            log::warn!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: ConsoleConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SEARCH_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Some(url) = lookup("DRES_URL") {
            self.dres.url = url;
        }
        if let Some(username) = lookup("DRES_USERNAME") {
            self.dres.username = username;
        }
        if let Some(password) = lookup("DRES_PASSWORD") {
            self.dres.password = password;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".into(),
            ));
        }
        settings::validate(&self.search)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
