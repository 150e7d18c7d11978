//! Operation handlers exposed to the host application

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::response::ApiResponse;
use crate::analysis::{
    OptimizationReport, OptimizationService, QueryAnalysisResult, QueryAnalyzer, ReportThresholds,
    param_from_json,
};
use crate::config::{Config, ConfigLoader};
use crate::storage::migration::resolve_migrations_dir;
use crate::storage::{
    CheckpointManager, CheckpointMode, CheckpointOptions, CheckpointResult, CheckpointStats,
    Database, IndexAnalysis, IntegrityCheckResult, Maintenance, MigrationReport, MigrationRunner,
    MigrationStatus, PerformanceStats, SharedDatabase, VacuumReport,
};
use crate::types::Result;

/// Partial update of the checkpoint options; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckpointOptionsUpdate {
    pub max_wal_size: Option<u64>,
    pub interval_ms: Option<u64>,
    pub mode: Option<String>,
}

impl CheckpointOptionsUpdate {
    fn apply(&self, current: &CheckpointOptions) -> Result<CheckpointOptions> {
        let mode = match &self.mode {
            Some(mode) => CheckpointMode::from_name(mode)?,
            None => current.mode,
        };
        CheckpointOptions::new(
            self.max_wal_size.unwrap_or(current.max_wal_size),
            self.interval_ms
                .map_or(current.interval, Duration::from_millis),
            mode,
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointStatus {
    pub monitoring: bool,
    pub max_wal_size: u64,
    pub stats: CheckpointStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalInfo {
    pub database_path: Option<PathBuf>,
    pub wal_path: Option<PathBuf>,
    pub wal_size_bytes: u64,
    pub journal_mode: String,
    pub auto_checkpoint_pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalStatus {
    pub enabled: bool,
    pub journal_mode: String,
    pub wal_size_bytes: u64,
    pub max_wal_size: u64,
    pub over_limit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalModeChange {
    pub journal_mode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReindexOutcome {
    pub target: Option<String>,
}

/// One handler per exposed operation over a shared database.
pub struct StoreApi {
    database: SharedDatabase,
    checkpoint: RwLock<Arc<CheckpointManager>>,
    migrations_dir: PathBuf,
    thresholds: ReportThresholds,
    monitor_on_startup: bool,
}

impl StoreApi {
    pub fn new(
        database: SharedDatabase,
        options: CheckpointOptions,
        migrations_dir: impl Into<PathBuf>,
        thresholds: ReportThresholds,
    ) -> Self {
        let checkpoint = Arc::new(CheckpointManager::new(database.state(), options));
        Self {
            database,
            checkpoint: RwLock::new(checkpoint),
            migrations_dir: migrations_dir.into(),
            thresholds,
            monitor_on_startup: true,
        }
    }

    /// Whether `startup()` launches the background checkpoint monitor.
    pub fn with_monitor_on_startup(mut self, enabled: bool) -> Self {
        self.monitor_on_startup = enabled;
        self
    }

    /// Handlers over the configured database. Nothing is opened yet.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let database = Arc::new(Database::from_config(config)?);
        let migrations_dir = resolve_migrations_dir(config.migrations.dir.as_deref());
        Ok(Self::new(
            database,
            config.checkpoint.options()?,
            migrations_dir,
            ReportThresholds::from(&config.analysis),
        )
        .with_monitor_on_startup(config.checkpoint.enabled))
    }

    /// Load configuration the usual way and build handlers from it.
    pub fn load() -> Result<Self> {
        Self::from_config(&ConfigLoader::load()?)
    }

    pub fn database(&self) -> &SharedDatabase {
        &self.database
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Current checkpoint manager (replaced by `checkpoint_reconfigure`)
    pub fn checkpoint_manager(&self) -> Arc<CheckpointManager> {
        Arc::clone(
            &self
                .checkpoint
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    /// Open the database, apply pending migrations, then start the
    /// checkpoint monitor. Any failure aborts before the monitor starts.
    pub fn startup(&self) -> Result<MigrationReport> {
        self.database.initialize()?;
        let report = self.migration_runner().run()?;
        if self.monitor_on_startup {
            self.checkpoint_manager().start()?;
        }
        Ok(report)
    }

    /// Stop the monitor and close the database.
    pub fn shutdown(&self) -> Result<()> {
        self.checkpoint_manager().stop();
        self.database.close()
    }

    fn maintenance(&self) -> Maintenance {
        Maintenance::new(self.database.state())
    }

    fn migration_runner(&self) -> MigrationRunner {
        MigrationRunner::new(self.database.state(), self.migrations_dir.clone())
    }

    // =========================================================================
    // Checkpoint
    // =========================================================================

    /// Checkpoint now at `mode`, or at the configured mode.
    pub fn checkpoint_trigger(&self, mode: Option<&str>) -> ApiResponse<CheckpointResult> {
        ApiResponse::from_result("checkpoint_trigger", self.trigger(mode))
    }

    fn trigger(&self, mode: Option<&str>) -> Result<CheckpointResult> {
        let manager = self.checkpoint_manager();
        let mode = match mode {
            Some(mode) => CheckpointMode::from_name(mode)?,
            None => manager.options().mode,
        };
        manager.perform_checkpoint(mode)
    }

    pub fn checkpoint_force(&self) -> ApiResponse<CheckpointResult> {
        ApiResponse::from_result(
            "checkpoint_force",
            self.checkpoint_manager().force_checkpoint(),
        )
    }

    pub fn checkpoint_status(&self) -> ApiResponse<CheckpointStatus> {
        let manager = self.checkpoint_manager();
        ApiResponse::from_result(
            "checkpoint_status",
            manager.get_checkpoint_stats().map(|stats| CheckpointStatus {
                monitoring: manager.is_running(),
                max_wal_size: manager.options().max_wal_size,
                stats,
            }),
        )
    }

    pub fn checkpoint_config(&self) -> ApiResponse<CheckpointOptions> {
        ApiResponse::ok(*self.checkpoint_manager().options())
    }

    /// Swap in a manager with new options, keeping the monitor's run state.
    pub fn checkpoint_reconfigure(
        &self,
        update: &CheckpointOptionsUpdate,
    ) -> ApiResponse<CheckpointOptions> {
        ApiResponse::from_result("checkpoint_reconfigure", self.reconfigure(update))
    }

    fn reconfigure(&self, update: &CheckpointOptionsUpdate) -> Result<CheckpointOptions> {
        let mut slot = self
            .checkpoint
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let options = update.apply(slot.options())?;

        let was_running = slot.is_running();
        slot.stop();
        let manager = Arc::new(CheckpointManager::new(self.database.state(), options));
        if was_running {
            manager.start()?;
        }
        *slot = manager;

        info!(
            max_wal_size = options.max_wal_size,
            interval_ms = options.interval.as_millis() as u64,
            mode = %options.mode,
            "Checkpoint options updated"
        );
        Ok(options)
    }

    // =========================================================================
    // WAL
    // =========================================================================

    pub fn wal_info(&self) -> ApiResponse<WalInfo> {
        ApiResponse::from_result("wal_info", self.read_wal_info())
    }

    fn read_wal_info(&self) -> Result<WalInfo> {
        let handle = self.database.connection()?;
        let stats = self.checkpoint_manager().get_checkpoint_stats()?;
        Ok(WalInfo {
            database_path: handle.path().map(Path::to_path_buf),
            wal_path: handle.wal_path(),
            wal_size_bytes: stats.wal_size_bytes,
            journal_mode: stats.journal_mode,
            auto_checkpoint_pages: stats.auto_checkpoint_pages,
        })
    }

    pub fn wal_enable(&self) -> ApiResponse<JournalModeChange> {
        ApiResponse::from_result(
            "wal_enable",
            self.maintenance()
                .enable_wal()
                .map(|journal_mode| JournalModeChange { journal_mode }),
        )
    }

    pub fn wal_status(&self) -> ApiResponse<WalStatus> {
        let manager = self.checkpoint_manager();
        ApiResponse::from_result(
            "wal_status",
            manager.get_checkpoint_stats().map(|stats| {
                let max_wal_size = manager.options().max_wal_size;
                WalStatus {
                    enabled: stats.journal_mode.eq_ignore_ascii_case("wal"),
                    over_limit: stats.wal_size_bytes > max_wal_size,
                    wal_size_bytes: stats.wal_size_bytes,
                    journal_mode: stats.journal_mode,
                    max_wal_size,
                }
            }),
        )
    }

    // =========================================================================
    // Analysis
    // =========================================================================

    pub fn analyze_query(
        &self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> ApiResponse<QueryAnalysisResult> {
        let params: Vec<_> = params.iter().map(param_from_json).collect();
        ApiResponse::from_result(
            "analyze_query",
            QueryAnalyzer::new(self.database.state()).analyze_query(sql, &params),
        )
    }

    pub fn optimization_report(&self) -> ApiResponse<OptimizationReport> {
        ApiResponse::from_result(
            "optimization_report",
            OptimizationService::new(self.database.state(), self.thresholds).generate_report(),
        )
    }

    pub fn optimize(&self) -> ApiResponse<OptimizationReport> {
        ApiResponse::from_result(
            "optimize",
            OptimizationService::new(self.database.state(), self.thresholds).optimize(),
        )
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    pub fn index_analysis(&self) -> ApiResponse<IndexAnalysis> {
        ApiResponse::from_result("index_analysis", self.maintenance().index_analysis())
    }

    pub fn reindex(&self, target: Option<&str>) -> ApiResponse<ReindexOutcome> {
        ApiResponse::from_result(
            "reindex",
            self.maintenance().reindex(target).map(|()| ReindexOutcome {
                target: target.map(str::to_string),
            }),
        )
    }

    pub fn vacuum(&self) -> ApiResponse<VacuumReport> {
        ApiResponse::from_result("vacuum", self.maintenance().vacuum())
    }

    pub fn performance_stats(&self) -> ApiResponse<PerformanceStats> {
        ApiResponse::from_result("performance_stats", self.maintenance().performance_stats())
    }

    pub fn integrity_check(&self) -> ApiResponse<IntegrityCheckResult> {
        ApiResponse::from_result("integrity_check", self.maintenance().integrity_check())
    }

    pub fn migration_status(&self) -> ApiResponse<MigrationStatus> {
        ApiResponse::from_result("migration_status", self.migration_runner().status())
    }
}
