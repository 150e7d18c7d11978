//! Walden Store - embedded SQLite persistence core
//!
//! Manages a single-writer, file-backed SQLite database for a desktop
//! application: the connection lifecycle, versioned schema migrations,
//! WAL checkpoint scheduling, and query-plan based optimization analysis.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use walden_store::{CheckpointManager, CheckpointOptions, Database, MigrationRunner};
//!
//! let db = Arc::new(Database::new("walden.db"));
//! db.initialize()?;
//! MigrationRunner::new(db.state(), "migrations").run()?;
//!
//! let checkpoints = CheckpointManager::new(db.state(), CheckpointOptions::default());
//! checkpoints.start()?;
//! ```
//!
//! ## Modules
//!
//! - [`storage`]: connection state, lifecycle, migrations, checkpoints, maintenance
//! - [`analysis`]: plan classification, query scoring, optimization reports
//! - [`api`]: `{success, data | error}` handlers for the host application
//! - [`config`]: layered configuration (defaults, TOML files, environment)

pub mod analysis;
pub mod api;
pub mod cli;
pub mod config;
pub mod constants;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::{ErrorKind, Result, ResultExt, StoreError};

// Storage
pub use storage::{
    CheckpointManager, CheckpointMode, CheckpointOptions, CheckpointResult, ConnectionState,
    Database, Maintenance, MigrationRunner, SharedDatabase,
};

// =============================================================================
// Analysis and API Re-exports
// =============================================================================

pub use analysis::{OptimizationReport, OptimizationService, QueryAnalysisResult, QueryAnalyzer};
pub use api::{ApiResponse, StoreApi};
