//! CLI Common Utilities
//!
//! Shared context for command handlers: loaded configuration, the API
//! over the configured database, and output rendering.

use std::path::PathBuf;

use serde::Serialize;

use super::ui::Output;
use crate::api::{ApiResponse, StoreApi};
use crate::config::{Config, ConfigLoader};
use crate::storage::{MigrationReport, MigrationRunner, SharedHandle};
use crate::types::Result;

/// How command results are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    /// The response envelope as pretty JSON
    Json,
}

/// Command execution context
pub struct CommandContext {
    pub config: Config,
    pub api: StoreApi,
    pub output: Output,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Load configuration (with an optional database path override).
    /// The database is not opened yet.
    pub fn load(db_path: Option<PathBuf>, format: OutputFormat) -> Result<Self> {
        let mut config = ConfigLoader::load()?;
        if db_path.is_some() {
            config.database.path = db_path;
        }
        let api = StoreApi::from_config(&config)?;

        Ok(Self {
            config,
            api,
            output: Output::new(),
            format,
        })
    }

    /// Open the database without touching the schema.
    pub fn open_unmigrated(&self) -> Result<SharedHandle> {
        self.api.database().initialize()
    }

    /// Open the database and bring the schema up to date.
    pub fn open(&self) -> Result<MigrationReport> {
        self.open_unmigrated()?;
        self.migrate()
    }

    pub fn migrate(&self) -> Result<MigrationReport> {
        MigrationRunner::new(self.api.database().state(), self.api.migrations_dir()).run()
    }

    /// Print a response and report whether it succeeded.
    ///
    /// JSON mode prints the envelope as is; text mode hands the payload to
    /// `render` or prints the error line.
    pub fn emit<T, F>(&self, response: ApiResponse<T>, render: F) -> Result<bool>
    where
        T: Serialize,
        F: FnOnce(&Output, &T),
    {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
            OutputFormat::Text => {
                if let Some(data) = &response.data {
                    render(&self.output, data);
                }
                if let Some(err) = &response.error {
                    self.output
                        .error(&format!("{}: {}", err.error_type, err.message));
                }
            }
        }
        Ok(response.success)
    }

    /// Print a plain serializable value (no envelope failure possible).
    pub fn emit_ok<T, F>(&self, data: T, render: F) -> Result<bool>
    where
        T: Serialize,
        F: FnOnce(&Output, &T),
    {
        self.emit(ApiResponse::ok(data), render)
    }
}
