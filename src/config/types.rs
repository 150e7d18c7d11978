//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (platform config dir) and project (.walden/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{analysis, checkpoint, database};
use crate::storage::{CheckpointMode, CheckpointOptions};
use crate::types::{Result, StoreError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Database file and connection tuning
    pub database: DatabaseConfig,

    /// WAL checkpoint scheduling
    pub checkpoint: CheckpointConfig,

    /// Migration script discovery
    pub migrations: MigrationConfig,

    /// Query analysis thresholds
    pub analysis: AnalysisConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database: DatabaseConfig::default(),
            checkpoint: CheckpointConfig::default(),
            migrations: MigrationConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `StoreError::InvalidOption` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if self.database.busy_timeout_ms == 0 {
            return Err(StoreError::invalid_option(
                "database.busy_timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.database.cache_size_kib <= 0 {
            return Err(StoreError::invalid_option(
                "database.cache_size_kib",
                format!("must be positive, got {}", self.database.cache_size_kib),
            ));
        }

        if self.checkpoint.auto_checkpoint_pages == 0 {
            return Err(StoreError::invalid_option(
                "checkpoint.auto_checkpoint_pages",
                "must be greater than 0",
            ));
        }

        // Threshold and interval share the manager's own validation
        self.checkpoint.options()?;

        if !(self.analysis.slow_query_ms > 0.0) {
            return Err(StoreError::invalid_option(
                "analysis.slow_query_ms",
                format!("must be greater than 0, got {}", self.analysis.slow_query_ms),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Explicit database file (defaults to the platform data directory)
    pub path: Option<PathBuf>,

    /// Busy handler timeout in milliseconds
    pub busy_timeout_ms: u64,

    /// Page cache size in KiB
    pub cache_size_kib: i64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: database::DEFAULT_BUSY_TIMEOUT_MS,
            cache_size_kib: database::DEFAULT_CACHE_SIZE_KIB,
        }
    }
}

// =============================================================================
// Checkpoint Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Run the background WAL monitor
    pub enabled: bool,

    /// WAL size in bytes that triggers a checkpoint
    pub max_wal_size: u64,

    /// Monitor poll interval in milliseconds
    pub interval_ms: u64,

    /// Mode used by automatic checkpoints
    pub mode: CheckpointMode,

    /// Engine auto-checkpoint threshold (pages)
    pub auto_checkpoint_pages: u32,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_wal_size: checkpoint::DEFAULT_MAX_WAL_SIZE,
            interval_ms: checkpoint::DEFAULT_INTERVAL_MS,
            mode: CheckpointMode::default(),
            auto_checkpoint_pages: checkpoint::DEFAULT_AUTO_CHECKPOINT_PAGES,
        }
    }
}

impl CheckpointConfig {
    /// Build validated manager options from this section
    pub fn options(&self) -> Result<CheckpointOptions> {
        CheckpointOptions::new(
            self.max_wal_size,
            Duration::from_millis(self.interval_ms),
            self.mode,
        )
    }
}

// =============================================================================
// Migration Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Explicit migrations directory (skips development/installed lookup)
    pub dir: Option<PathBuf>,
}

// =============================================================================
// Analysis Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Queries slower than this (ms) are reported as slow
    pub slow_query_ms: f64,

    /// Unpaginated result sets above this row count are flagged
    pub large_result_rows: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            slow_query_ms: analysis::DEFAULT_SLOW_QUERY_MS,
            large_result_rows: analysis::DEFAULT_LARGE_RESULT_ROWS,
        }
    }
}
