//! Config Command
//!
//! Usage:
//!   walden config show [--format toml|json]
//!   walden config path
//!   walden config init [--global] [--force]

use crate::cli::ui::Output;
use crate::config::{Config, ConfigLoader};
use crate::types::{Result, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Toml,
    Json,
}

/// Print the effective (merged) configuration.
pub fn show(config: &Config, format: ConfigFormat) -> Result<()> {
    let rendered = match format {
        ConfigFormat::Toml => toml::to_string_pretty(config)
            .map_err(|e| StoreError::Config(format!("Failed to render config: {}", e)))?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
    };
    println!("{}", rendered);
    Ok(())
}

/// Print where configuration and data live.
pub fn path(config: &Config) -> Result<()> {
    let out = Output::new();
    out.section("Paths");
    match ConfigLoader::global_config_path() {
        Some(path) => out.field("Global config", path.display()),
        None => out.field("Global config", "(unavailable)"),
    }
    out.field(
        "Project config",
        ConfigLoader::project_config_path().display(),
    );
    out.field("Database", ConfigLoader::database_path(config)?.display());
    Ok(())
}

/// Write a default config file.
pub fn init(global: bool, force: bool) -> Result<()> {
    let path = ConfigLoader::init(global, force)?;
    Output::new().success(&format!("Config at {}", path.display()));
    Ok(())
}
