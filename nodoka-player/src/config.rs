//! Resolved player configuration
//!
//! Bootstrap values come from [`nodoka_common::config::TomlConfig`] and the
//! data folder resolution chain. Runtime preferences (volume, speed) are
//! not here; see [`crate::db::settings`].

use nodoka_common::config::{resolve_data_folder, TomlConfig, DATA_FOLDER_ENV};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Player configuration after all sources are merged
#[derive(Debug, Clone)]
pub struct Config {
    pub data_folder: PathBuf,
    pub db_path: PathBuf,
    pub sidecar_folder: PathBuf,
    pub proxy_cache_capacity: usize,
    pub position_tick: Duration,
}

impl Config {
    /// Merge a loaded TOML config with an optional command-line data folder
    pub fn resolve(cli_data_folder: Option<&Path>, toml: &TomlConfig) -> Self {
        let data_folder = resolve_data_folder(cli_data_folder, DATA_FOLDER_ENV, toml);
        Self::for_data_folder(data_folder, toml)
    }

    /// Derive every path from an already resolved data folder
    pub fn for_data_folder(data_folder: PathBuf, toml: &TomlConfig) -> Self {
        let db_path = toml
            .database_path
            .clone()
            .unwrap_or_else(|| data_folder.join("nodoka.db"));
        let sidecar_folder = toml
            .sidecar_folder
            .clone()
            .unwrap_or_else(|| data_folder.join("sidecar"));

        Self {
            data_folder,
            db_path,
            sidecar_folder,
            proxy_cache_capacity: toml.proxy_cache_capacity,
            position_tick: Duration::from_millis(toml.position_tick_ms.max(1)),
        }
    }
}
