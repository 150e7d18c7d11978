//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (<platform config dir>/walden/config.toml)
//! 3. Project config (.walden/config.toml)
//! 4. Environment variables (WALDEN_* prefix, `__` separates sections)

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::constants::database::{APP_NAME, FILE_NAME};
use crate::types::{Result, StoreError};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // e.g. WALDEN_CHECKPOINT__MAX_WAL_SIZE -> checkpoint.max_wal_size
        figment = figment.merge(Env::prefixed("WALDEN_").split("__").lowercase(true));

        Self::extract(figment)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Config> {
        let config: Config = figment
            .extract()
            .map_err(|e| StoreError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", APP_NAME)
    }

    /// Global config directory
    pub fn global_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Per-user application data directory holding the database
    pub fn data_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Project config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".walden/config.toml")
    }

    /// Resolve the database file: explicit config path, else the data directory.
    pub fn database_path(config: &Config) -> Result<PathBuf> {
        if let Some(path) = &config.database.path {
            return Ok(path.clone());
        }

        Self::data_dir()
            .map(|dir| dir.join(FILE_NAME))
            .ok_or_else(|| StoreError::Config("Cannot determine application data directory".to_string()))
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write a default config file (global or project). Existing files are
    /// kept unless `force` is set.
    pub fn init(global: bool, force: bool) -> Result<PathBuf> {
        let path = if global {
            Self::global_config_path().ok_or_else(|| {
                StoreError::Config("Cannot determine global config directory".to_string())
            })?
        } else {
            Self::project_config_path()
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        if !path.exists() || force {
            fs::write(&path, Self::default_config_toml())?;
            info!("Created config: {}", path.display());
        } else {
            info!("Config exists: {}", path.display());
        }

        Ok(path)
    }

    /// Default config file content (TOML)
    fn default_config_toml() -> String {
        r#"# Walden Store Configuration
# Project settings in .walden/config.toml override the global file.

version = "1.0"

[database]
# path = "/custom/location/walden.db"
busy_timeout_ms = 5000
cache_size_kib = 64000

[checkpoint]
enabled = true
max_wal_size = 10485760
interval_ms = 60000
# passive | full | restart | truncate
mode = "passive"
auto_checkpoint_pages = 1000

[analysis]
slow_query_ms = 50.0
large_result_rows = 100
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [checkpoint]
            interval_ms = 1500
            mode = "FULL"
            "#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.checkpoint.interval_ms, 1500);
        assert_eq!(config.checkpoint.mode, crate::storage::CheckpointMode::Full);
        assert_eq!(config.database.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_load_from_file_validates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[checkpoint]\nmax_wal_size = 0\n").unwrap();

        assert!(ConfigLoader::load_from_file(&path).is_err());
    }

    #[test]
    fn test_default_config_toml_parses() {
        let config: Config = toml::from_str(&ConfigLoader::default_config_toml()).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_path_prefers_explicit() {
        let mut config = Config::default();
        config.database.path = Some(PathBuf::from("/tmp/custom.db"));
        assert_eq!(
            ConfigLoader::database_path(&config).unwrap(),
            PathBuf::from("/tmp/custom.db")
        );
    }
}
