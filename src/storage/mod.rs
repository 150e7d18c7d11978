pub mod checkpoint;
pub mod lifecycle;
pub mod maintenance;
pub mod migration;
pub mod state;

pub use checkpoint::{
    CheckpointBackend, CheckpointManager, CheckpointMode, CheckpointOptions, CheckpointResult,
    CheckpointStats, SqliteCheckpointBackend, WalCheckpointRow,
};
pub use lifecycle::{
    ConnectionSettings, Database, DatabaseLocation, SharedDatabase, run_in_transaction,
};
pub use maintenance::{
    IndexAnalysis, IndexInfo, IntegrityCheckResult, Maintenance, PerformanceStats, TableIndexes,
    TableStats, VacuumReport,
};
pub use migration::{
    MigrationReport, MigrationRunner, MigrationScript, MigrationSink, MigrationStatus,
};
pub use state::{ConnectionState, DbHandle, SharedHandle};
