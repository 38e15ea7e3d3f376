use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::error::WeatherError;

/// Environment variables checked for the API key, in priority order.
pub const API_KEY_VARS: &[&str] = &["OPENWEATHER_API_KEY", "API_KEY"];

const CACHE_FILE_NAME: &str = "weather_cache.json";

/// Base URLs of the upstream API; endpoint paths are appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub geocoding: String,
    pub data: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            geocoding: "http://api.openweathermap.org".to_string(),
            data: "https://api.openweathermap.org".to_string(),
        }
    }
}

impl Endpoints {
    /// Points both endpoint families at one host (handy for a local mock).
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            geocoding: base.clone(),
            data: base,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Per-attempt timeout.
    pub timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            timeout_secs: 10,
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Overrides the platform cache location when set.
    pub path: Option<PathBuf>,
    /// Most entries kept; values above the cache's hard cap of 10 are clamped.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: None,
            capacity: 10,
        }
    }
}

/// Top-level configuration, stored on disk as TOML.
///
/// Example:
/// ```toml
/// api_key = "..."
/// lang = "ru"
///
/// [retry]
/// max_attempts = 3
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub lang: String,
    pub units: String,
    pub endpoints: Endpoints,
    pub retry: RetrySettings,
    pub cache: CacheSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            lang: "ru".to_string(),
            units: "metric".to_string(),
            endpoints: Endpoints::default(),
            retry: RetrySettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl Config {
    /// Load config from disk (defaults if the file doesn't exist yet), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;

        let mut cfg = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            toml::from_str::<Config>(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        cfg.apply_env();
        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = project_dirs()
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Environment wins over the file; blank values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = API_KEY_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|value| !value.trim().is_empty());

        if let Some(key) = key {
            self.api_key = Some(key);
        }
    }

    /// Returns the API key or fails before any network call is made.
    pub fn require_api_key(&self) -> Result<&str, WeatherError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                WeatherError::Configuration(format!(
                    "API key is not set. Export {} or run `weatherbot configure`.",
                    API_KEY_VARS[0]
                ))
            })
    }

    /// Where the result cache lives.
    pub fn cache_file_path(&self) -> PathBuf {
        if let Some(path) = &self.cache.path {
            return path.clone();
        }

        match project_dirs() {
            Some(dirs) => dirs.cache_dir().join(CACHE_FILE_NAME),
            None => PathBuf::from(CACHE_FILE_NAME),
        }
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key);
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "weatherbot", "weatherbot")
}
