//! Configuration loading.
//!
//! Defaults live in [`defaults`], environment variable names in
//! [`env_vars`]. A [`Config`] is read from an optional TOML file and then
//! overridden by the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default values
pub mod defaults {
    pub const EXTENSIONS_DIR: &str = "extensions";
    pub const INDEX_BASE_URL: &str =
        "https://raw.githubusercontent.com/rs1703/nonbiri-extensions-dev/releases";
    /// Minimum interval between two index fetches.
    pub const INDEX_COOLDOWN_SECS: u64 = 600;
    pub const HTTP_TIMEOUT_SECS: u64 = 30;
    pub const DATABASE_PATH: &str = "nonbiri.redb";
    pub const MANGA_CACHE_CAPACITY: usize = 256;
    pub const CHAPTER_CACHE_CAPACITY: usize = 128;
    pub const CHAPTER_BATCH_CACHE_CAPACITY: usize = 8;
}

/// Environment variable names
pub mod env_vars {
    pub const CONFIG: &str = "NONBIRI_CONFIG";
    pub const EXTENSIONS_DIR: &str = "NONBIRI_EXTENSIONS_DIR";
    pub const INDEX_URL: &str = "NONBIRI_INDEX_URL";
    pub const INDEX_COOLDOWN_SECS: &str = "NONBIRI_INDEX_COOLDOWN_SECS";
    pub const HTTP_TIMEOUT_SECS: &str = "NONBIRI_HTTP_TIMEOUT_SECS";
    pub const DATABASE: &str = "NONBIRI_DATABASE";
    pub const LOG_JSON: &str = "NONBIRI_LOG_JSON";
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Capacities of the three entity caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub manga: usize,
    pub chapter: usize,
    pub chapter_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            manga: defaults::MANGA_CACHE_CAPACITY,
            chapter: defaults::CHAPTER_CACHE_CAPACITY,
            chapter_batch: defaults::CHAPTER_BATCH_CACHE_CAPACITY,
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding installed module files
    pub extensions_dir: PathBuf,
    /// Base address of the remote index
    pub index_base_url: String,
    pub index_cooldown_secs: u64,
    pub http_timeout_secs: u64,
    /// Library database file
    pub database_path: PathBuf,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensions_dir: PathBuf::from(defaults::EXTENSIONS_DIR),
            index_base_url: defaults::INDEX_BASE_URL.to_string(),
            index_cooldown_secs: defaults::INDEX_COOLDOWN_SECS,
            http_timeout_secs: defaults::HTTP_TIMEOUT_SECS,
            database_path: PathBuf::from(defaults::DATABASE_PATH),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from `path` (or `NONBIRI_CONFIG` when `None`), then apply
    /// environment overrides. Without a file, defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(env_vars::CONFIG).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in
    /// [`load`](Self::load)).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(dir) = lookup(env_vars::EXTENSIONS_DIR) {
            self.extensions_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(env_vars::INDEX_URL) {
            self.index_base_url = url;
        }
        if let Some(value) = lookup(env_vars::INDEX_COOLDOWN_SECS) {
            self.index_cooldown_secs = parse_number(env_vars::INDEX_COOLDOWN_SECS, &value)?;
        }
        if let Some(value) = lookup(env_vars::HTTP_TIMEOUT_SECS) {
            self.http_timeout_secs = parse_number(env_vars::HTTP_TIMEOUT_SECS, &value)?;
        }
        if let Some(path) = lookup(env_vars::DATABASE) {
            self.database_path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "index_base_url".into(),
                value: self.index_base_url.clone(),
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "http_timeout_secs".into(),
                value: "0".into(),
            });
        }
        Ok(())
    }

    pub fn index_cooldown(&self) -> Duration {
        Duration::from_secs(self.index_cooldown_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
