//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Database file layout and connection tuning
pub mod database {
    /// Application identifier used for platform data/config directories
    pub const APP_NAME: &str = "walden";

    /// Database file name inside the data directory
    pub const FILE_NAME: &str = "walden.db";

    /// Suffix SQLite appends to the database path for the WAL sidecar
    pub const WAL_SUFFIX: &str = "-wal";

    /// Page cache size in KiB (negative `cache_size` pragma value)
    pub const DEFAULT_CACHE_SIZE_KIB: i64 = 64_000;

    /// Busy handler timeout in milliseconds
    pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
}

/// WAL checkpoint scheduling defaults
pub mod checkpoint {
    /// WAL size above which the background monitor checkpoints (10 MiB)
    pub const DEFAULT_MAX_WAL_SIZE: u64 = 10 * 1024 * 1024;

    /// Poll interval of the background monitor (milliseconds)
    pub const DEFAULT_INTERVAL_MS: u64 = 60_000;

    /// Engine auto-checkpoint threshold in pages
    pub const DEFAULT_AUTO_CHECKPOINT_PAGES: u32 = 1_000;

    /// Name of the background monitor thread
    pub const THREAD_NAME: &str = "wal-checkpoint";
}

/// Migration discovery
pub mod migration {
    /// Directory name holding the numbered `.sql` scripts
    pub const DIR_NAME: &str = "migrations";

    /// Versioned script file name: `NNN-description.sql`
    pub const FILENAME_PATTERN: &str = r"^(\d+)-.+\.sql$";
}

/// Query analysis scoring weights and thresholds
pub mod analysis {
    /// Penalty per table scan without an index
    pub const TABLE_SCAN_PENALTY: u32 = 30;

    /// Penalty per temporary B-tree (sort / distinct / group spill)
    pub const TEMP_STRUCTURE_PENALTY: u32 = 20;

    /// Penalty per nested-loop join step
    pub const NESTED_LOOP_PENALTY: u32 = 15;

    /// Penalty per explicit full-scan marker
    pub const FULL_SCAN_PENALTY: u32 = 25;

    /// Latency tiers (ms, penalty). Tiers stack: a 1200ms query pays all three.
    pub const LATENCY_TIERS: [(f64, u32); 3] = [(100.0, 20), (500.0, 30), (1000.0, 40)];

    /// Upper bound of the inefficiency score
    pub const MAX_SCORE: u32 = 100;

    /// Queries slower than this land in the report's slow list (ms)
    pub const DEFAULT_SLOW_QUERY_MS: f64 = 50.0;

    /// Result sets above this many rows without LIMIT are flagged
    pub const DEFAULT_LARGE_RESULT_ROWS: usize = 100;

    /// Average score above which the report suggests a schema review
    pub const HIGH_AVERAGE_SCORE: f64 = 50.0;
}
