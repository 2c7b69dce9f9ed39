//! Configuration management for the refresh coordinator
//!
//! Persists the auto-refresh switch and per-key polling settings as JSON.
//! Supports Windows, macOS, and Linux config locations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::refresh::RefreshKey;

/// Environment variable overriding the settings file location
pub const CONFIG_PATH_ENV: &str = "DASHBOARD_REFRESH_CONFIG";

/// Errors raised while reading or writing settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform config directory could be resolved
    #[error("Could not determine config path")]
    NoConfigDir,

    /// Filesystem access failed
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file was not valid JSON for this schema
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// An interval of zero milliseconds was configured
    #[error("Interval for '{0}' must be greater than zero")]
    ZeroInterval(String),
}

/// Settings for an individual refresh key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySettings {
    /// Whether the key polls
    pub enabled: bool,
    /// Polling period in milliseconds
    pub interval_ms: u64,
}

impl KeySettings {
    /// Returns the built-in settings for a key
    pub fn for_key(key: RefreshKey) -> Self {
        Self {
            enabled: key.enabled_by_default(),
            interval_ms: millis(key.default_interval()),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Refresh settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    /// Master auto-refresh switch
    pub auto_refresh_enabled: bool,
    /// Informational default interval in milliseconds
    pub default_interval_ms: u64,
    /// Per-key settings; keys left out keep their built-in values
    pub keys: BTreeMap<RefreshKey, KeySettings>,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            auto_refresh_enabled: true,
            default_interval_ms: 30_000,
            keys: RefreshKey::ALL
                .into_iter()
                .map(|key| (key, KeySettings::for_key(key)))
                .collect(),
        }
    }
}

impl RefreshSettings {
    /// Gets the config directory path (cross-platform)
    fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|p| PathBuf::from(p).join("DashboardRefresh"))
        }

        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|p| PathBuf::from(p).join("Library/Application Support/DashboardRefresh"))
        }

        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| std::env::var("HOME").ok().map(|p| PathBuf::from(p).join(".config")))
                .map(|p| p.join("dashboard-refresh"))
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }

    /// Gets the settings file path, honouring [`CONFIG_PATH_ENV`]
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Loads settings from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring settings at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Loads and validates settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings.with_missing_keys())
    }

    /// Saves settings to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Saves settings to a specific file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rejects zero intervals
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("default".to_string()));
        }
        for (key, settings) in &self.keys {
            if settings.interval_ms == 0 {
                return Err(ConfigError::ZeroInterval(key.to_string()));
            }
        }
        Ok(())
    }

    /// Settings for one key, falling back to built-in values
    pub fn key(&self, key: RefreshKey) -> KeySettings {
        self.keys
            .get(&key)
            .cloned()
            .unwrap_or_else(|| KeySettings::for_key(key))
    }

    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    fn with_missing_keys(mut self) -> Self {
        for key in RefreshKey::ALL {
            self.keys.entry(key).or_insert_with(|| KeySettings::for_key(key));
        }
        self
    }
}
