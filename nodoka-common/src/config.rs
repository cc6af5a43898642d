//! Bootstrap configuration loading and data folder resolution
//!
//! The TOML file only carries bootstrap concerns (where the database and the
//! sidecar store live, cache sizing, logging). Runtime preferences such as
//! volume and playback speed live in the `settings` table instead.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the data folder
pub const DATA_FOLDER_ENV: &str = "NODOKA_DATA_FOLDER";

/// Default ceiling for each proxy sub-cache
pub const DEFAULT_PROXY_CACHE_CAPACITY: usize = 1000;

/// Default interval between position events of the headless backend
pub const DEFAULT_POSITION_TICK_MS: u64 = 500;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the database and the sidecar store
    #[serde(default)]
    pub data_folder: Option<PathBuf>,

    /// Explicit database file (defaults to `<data_folder>/nodoka.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Explicit sidecar folder (defaults to `<data_folder>/sidecar`)
    #[serde(default)]
    pub sidecar_folder: Option<PathBuf>,

    /// Entries per proxy sub-cache before the cache is cleared
    #[serde(default = "default_proxy_cache_capacity")]
    pub proxy_cache_capacity: usize,

    /// Position event interval for the headless backend
    #[serde(default = "default_position_tick_ms")]
    pub position_tick_ms: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_proxy_cache_capacity() -> usize {
    DEFAULT_PROXY_CACHE_CAPACITY
}

fn default_position_tick_ms() -> u64 {
    DEFAULT_POSITION_TICK_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            data_folder: None,
            database_path: None,
            sidecar_folder: None,
            proxy_cache_capacity: DEFAULT_PROXY_CACHE_CAPACITY,
            position_tick_ms: DEFAULT_POSITION_TICK_MS,
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?;

        if config.proxy_cache_capacity == 0 {
            return Err(Error::Config(
                "proxy_cache_capacity must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }

    /// Load the explicit file, or the platform default file, falling back to
    /// built-in defaults when neither can be read.
    ///
    /// A missing or broken config file never aborts startup.
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let path = match explicit.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) => path,
            None => {
                warn!("Could not determine config directory, using defaults");
                return Self::default();
            }
        };

        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Platform config file location (`<config_dir>/nodoka/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nodoka").join("config.toml"))
}

/// OS-dependent default data folder
pub fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("nodoka"))
        .unwrap_or_else(|| PathBuf::from("./nodoka_data"))
}

/// Data folder resolution in priority order:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default
pub fn resolve_data_folder(cli_arg: Option<&Path>, env_var_name: &str, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.data_folder {
        return path.clone();
    }

    default_data_folder()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config = TomlConfig::parse("").unwrap();
        assert_eq!(config.proxy_cache_capacity, 1000);
        assert_eq!(config.position_tick_ms, 500);
        assert_eq!(config.logging.level, "info");
        assert!(config.data_folder.is_none());
    }

    #[test]
    fn test_parse_full() {
        let config = TomlConfig::parse(
            r#"
            data_folder = "/srv/nodoka"
            sidecar_folder = "/srv/nodoka/state"
            proxy_cache_capacity = 50
            position_tick_ms = 250

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_folder, Some(PathBuf::from("/srv/nodoka")));
        assert_eq!(config.sidecar_folder, Some(PathBuf::from("/srv/nodoka/state")));
        assert_eq!(config.proxy_cache_capacity, 50);
        assert_eq!(config.position_tick_ms, 250);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = TomlConfig::parse("proxy_cache_capacity = 0");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
