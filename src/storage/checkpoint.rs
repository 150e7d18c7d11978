//! WAL Checkpoint Manager
//!
//! Keeps the write-ahead log bounded. A background thread polls the WAL
//! size every `interval` and checkpoints when it exceeds `max_wal_size`.
//! Manual and forced checkpoints plus a stats snapshot are exposed for
//! diagnostics.
//!
//! ## Modes
//!
//! ```text
//! Passive --> Full --> Restart --> Truncate
//! (never blocks)            (resets WAL to zero bytes)
//! ```
//!
//! A busy checkpoint is reported as `success: false`. The manager never
//! escalates on its own; picking a stronger mode is the caller's call.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info, warn};

use super::state::ConnectionState;
use crate::constants::checkpoint::{DEFAULT_INTERVAL_MS, DEFAULT_MAX_WAL_SIZE, THREAD_NAME};
use crate::types::{Result, StoreError};

// =============================================================================
// Modes and Options
// =============================================================================

/// `PRAGMA wal_checkpoint` mode, from least to most aggressive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum CheckpointMode {
    /// Checkpoint as much as possible without waiting on readers or writers
    #[default]
    Passive,
    /// Block new writers until the whole WAL is checkpointed
    Full,
    /// Like Full, then wait for readers so the next writer restarts the WAL
    Restart,
    /// Like Restart, then truncate the WAL file to zero bytes
    Truncate,
}

impl CheckpointMode {
    /// All modes in escalation order
    pub const LADDER: [CheckpointMode; 4] = [
        CheckpointMode::Passive,
        CheckpointMode::Full,
        CheckpointMode::Restart,
        CheckpointMode::Truncate,
    ];

    /// SQL keyword for `PRAGMA wal_checkpoint(...)`
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Passive => "PASSIVE",
            Self::Full => "FULL",
            Self::Restart => "RESTART",
            Self::Truncate => "TRUNCATE",
        }
    }

    /// Parse a user-supplied mode name into a validation error on failure.
    pub fn from_name(name: &str) -> Result<Self> {
        name.parse()
            .map_err(|reason: String| StoreError::invalid_option("mode", reason))
    }
}

impl std::fmt::Display for CheckpointMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

impl std::str::FromStr for CheckpointMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "passive" => Ok(Self::Passive),
            "full" => Ok(Self::Full),
            "restart" => Ok(Self::Restart),
            "truncate" => Ok(Self::Truncate),
            _ => Err(format!(
                "Unknown checkpoint mode: {}. Valid values: passive, full, restart, truncate",
                s
            )),
        }
    }
}

impl TryFrom<String> for CheckpointMode {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// Immutable per-manager settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckpointOptions {
    /// WAL size in bytes above which a checkpoint runs
    pub max_wal_size: u64,
    /// Poll interval of the background monitor
    #[serde(rename = "interval_ms", serialize_with = "serialize_millis")]
    pub interval: Duration,
    /// Mode used by automatic checkpoints
    pub mode: CheckpointMode,
}

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

impl CheckpointOptions {
    /// Validated options. Zero thresholds and intervals are rejected.
    pub fn new(max_wal_size: u64, interval: Duration, mode: CheckpointMode) -> Result<Self> {
        if max_wal_size == 0 {
            return Err(StoreError::invalid_option(
                "max_wal_size",
                "must be greater than 0 bytes",
            ));
        }
        if interval.is_zero() {
            return Err(StoreError::invalid_option(
                "interval",
                "must be greater than 0",
            ));
        }
        Ok(Self {
            max_wal_size,
            interval,
            mode,
        })
    }
}

impl Default for CheckpointOptions {
    fn default() -> Self {
        Self {
            max_wal_size: DEFAULT_MAX_WAL_SIZE,
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            mode: CheckpointMode::Passive,
        }
    }
}

/// Outcome of one checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckpointResult {
    /// Frames in the WAL (-1 when the database is not in WAL mode)
    pub total_pages: i64,
    /// Frames copied back into the database file
    pub modified_pages: i64,
    /// False when a reader or writer kept the checkpoint from completing
    pub success: bool,
}

impl CheckpointResult {
    fn from_row(row: WalCheckpointRow) -> Self {
        Self {
            total_pages: row.log_frames,
            modified_pages: row.checkpointed_frames,
            success: row.busy == 0,
        }
    }
}

/// Raw `(busy, log, checkpointed)` triple returned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalCheckpointRow {
    pub busy: i64,
    pub log_frames: i64,
    pub checkpointed_frames: i64,
}

/// Diagnostic snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointStats {
    pub wal_size_bytes: u64,
    pub auto_checkpoint_pages: i64,
    pub journal_mode: String,
}

// =============================================================================
// Backend
// =============================================================================

/// Engine operations the manager needs.
pub trait CheckpointBackend: Send + Sync {
    /// Current WAL size in bytes; a missing WAL file is 0
    fn wal_size(&self) -> Result<u64>;

    /// Run `PRAGMA wal_checkpoint(mode)`
    fn wal_checkpoint(&self, mode: CheckpointMode) -> Result<WalCheckpointRow>;

    /// Engine auto-checkpoint threshold in pages
    fn auto_checkpoint_pages(&self) -> Result<i64>;

    /// Current journal mode (`wal`, `delete`, `memory`, ...)
    fn journal_mode(&self) -> Result<String>;
}

/// Backend over the shared live connection
pub struct SqliteCheckpointBackend {
    state: Arc<ConnectionState>,
}

impl SqliteCheckpointBackend {
    pub fn new(state: Arc<ConnectionState>) -> Self {
        Self { state }
    }
}

impl CheckpointBackend for SqliteCheckpointBackend {
    fn wal_size(&self) -> Result<u64> {
        let handle = self.state.get()?;
        let Some(wal_path) = handle.wal_path() else {
            return Ok(0);
        };
        match std::fs::metadata(&wal_path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn wal_checkpoint(&self, mode: CheckpointMode) -> Result<WalCheckpointRow> {
        let sql = format!("PRAGMA wal_checkpoint({})", mode.as_sql());
        self.state.with_conn(|conn| {
            Ok(conn.query_row(&sql, [], |row| {
                Ok(WalCheckpointRow {
                    busy: row.get(0)?,
                    log_frames: row.get(1)?,
                    checkpointed_frames: row.get(2)?,
                })
            })?)
        })
    }

    fn auto_checkpoint_pages(&self) -> Result<i64> {
        self.state.with_conn(|conn| {
            Ok(conn.pragma_query_value(None, "wal_autocheckpoint", |row| row.get(0))?)
        })
    }

    fn journal_mode(&self) -> Result<String> {
        self.state.with_conn(|conn| {
            Ok(conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?)
        })
    }
}

// =============================================================================
// Checkpoint Operations
// =============================================================================

fn perform_checkpoint(backend: &dyn CheckpointBackend, mode: CheckpointMode) -> Result<CheckpointResult> {
    let result = match backend.wal_checkpoint(mode) {
        Ok(row) => CheckpointResult::from_row(row),
        // A busy handler timing out is the same outcome as busy = 1
        Err(e) if e.is_transient() => {
            warn!(mode = %mode, "Checkpoint hit a busy database: {}", e);
            CheckpointResult {
                total_pages: 0,
                modified_pages: 0,
                success: false,
            }
        }
        Err(e) => return Err(e),
    };

    if result.success {
        info!(
            mode = %mode,
            total_pages = result.total_pages,
            modified_pages = result.modified_pages,
            "WAL checkpoint complete"
        );
    } else {
        warn!(
            mode = %mode,
            total_pages = result.total_pages,
            modified_pages = result.modified_pages,
            "WAL checkpoint blocked by an active connection"
        );
    }
    Ok(result)
}

fn check_and_perform(
    backend: &dyn CheckpointBackend,
    options: &CheckpointOptions,
) -> Result<Option<CheckpointResult>> {
    let wal_size = backend.wal_size()?;
    if wal_size <= options.max_wal_size {
        debug!(wal_size, max = options.max_wal_size, "WAL within limit");
        return Ok(None);
    }

    info!(
        wal_size,
        max = options.max_wal_size,
        "WAL exceeds limit, checkpointing"
    );
    perform_checkpoint(backend, options.mode).map(Some)
}

// =============================================================================
// Manager
// =============================================================================

struct Worker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Scheduler and entry point for WAL checkpoints.
pub struct CheckpointManager {
    backend: Arc<dyn CheckpointBackend>,
    options: CheckpointOptions,
    worker: Mutex<Option<Worker>>,
}

impl CheckpointManager {
    /// Manager over the shared connection
    pub fn new(state: Arc<ConnectionState>, options: CheckpointOptions) -> Self {
        Self::with_backend(Arc::new(SqliteCheckpointBackend::new(state)), options)
    }

    pub fn with_backend(backend: Arc<dyn CheckpointBackend>, options: CheckpointOptions) -> Self {
        Self {
            backend,
            options,
            worker: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &CheckpointOptions {
        &self.options
    }

    /// Start the background monitor. No-op when already running.
    pub fn start(&self) -> Result<()> {
        let mut worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if worker.is_some() {
            debug!("Checkpoint monitor already running");
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let backend = Arc::clone(&self.backend);
        let options = self.options;

        let handle = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(options.interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            // One failed tick must not stop monitoring
                            if let Err(e) = check_and_perform(backend.as_ref(), &options) {
                                warn!("Checkpoint tick failed: {}", e);
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Checkpoint monitor exited");
            })?;

        info!(
            interval_ms = options.interval.as_millis() as u64,
            max_wal_size = options.max_wal_size,
            mode = %options.mode,
            "Checkpoint monitor started"
        );
        *worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    /// Stop the background monitor and wait for the current tick to finish.
    /// No-op when not running.
    pub fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(Worker { stop_tx, handle }) = worker else {
            return;
        };

        // Either delivery or a disconnected receiver ends the loop
        let _ = stop_tx.send(());
        if handle.join().is_err() {
            warn!("Checkpoint monitor thread panicked");
        }
        info!("Checkpoint monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Checkpoint at the configured mode if the WAL is over the limit.
    ///
    /// Returns `None` when no checkpoint was needed.
    pub fn check_and_perform_checkpoint(&self) -> Result<Option<CheckpointResult>> {
        check_and_perform(self.backend.as_ref(), &self.options)
    }

    /// Checkpoint now at `mode`. Busy is reported, never retried.
    pub fn perform_checkpoint(&self, mode: CheckpointMode) -> Result<CheckpointResult> {
        perform_checkpoint(self.backend.as_ref(), mode)
    }

    /// Checkpoint at the most aggressive mode, shrinking the WAL to zero bytes.
    pub fn force_checkpoint(&self) -> Result<CheckpointResult> {
        perform_checkpoint(self.backend.as_ref(), CheckpointMode::Truncate)
    }

    /// WAL size, engine auto-checkpoint threshold and journal mode.
    pub fn get_checkpoint_stats(&self) -> Result<CheckpointStats> {
        Ok(CheckpointStats {
            wal_size_bytes: self.backend.wal_size()?,
            auto_checkpoint_pages: self.backend.auto_checkpoint_pages()?,
            journal_mode: self.backend.journal_mode()?,
        })
    }
}

impl Drop for CheckpointManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ConnectionSettings, Database, DatabaseLocation, DbHandle};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingBackend {
        wal_size: AtomicU64,
        busy: AtomicI64,
        fail_size: AtomicBool,
        size_reads: AtomicUsize,
        calls: Mutex<Vec<CheckpointMode>>,
    }

    impl RecordingBackend {
        fn with_size(size: u64) -> Arc<Self> {
            let backend = Self::default();
            backend.wal_size.store(size, Ordering::SeqCst);
            Arc::new(backend)
        }

        fn calls(&self) -> Vec<CheckpointMode> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CheckpointBackend for RecordingBackend {
        fn wal_size(&self) -> Result<u64> {
            self.size_reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_size.load(Ordering::SeqCst) {
                return Err(StoreError::Storage("stat failed".to_string()));
            }
            Ok(self.wal_size.load(Ordering::SeqCst))
        }

        fn wal_checkpoint(&self, mode: CheckpointMode) -> Result<WalCheckpointRow> {
            self.calls.lock().unwrap().push(mode);
            Ok(WalCheckpointRow {
                busy: self.busy.load(Ordering::SeqCst),
                log_frames: 10,
                checkpointed_frames: 7,
            })
        }

        fn auto_checkpoint_pages(&self) -> Result<i64> {
            Ok(1000)
        }

        fn journal_mode(&self) -> Result<String> {
            Ok("wal".to_string())
        }
    }

    fn options(max_wal_size: u64, mode: CheckpointMode) -> CheckpointOptions {
        CheckpointOptions::new(max_wal_size, Duration::from_millis(10), mode).unwrap()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("passive".parse::<CheckpointMode>().unwrap(), CheckpointMode::Passive);
        assert_eq!("TRUNCATE".parse::<CheckpointMode>().unwrap(), CheckpointMode::Truncate);
        assert_eq!("Restart".parse::<CheckpointMode>().unwrap(), CheckpointMode::Restart);
        assert!("aggressive".parse::<CheckpointMode>().is_err());
        assert_eq!(CheckpointMode::Full.as_sql(), "FULL");
    }

    #[test]
    fn test_options_validation() {
        assert!(CheckpointOptions::new(0, Duration::from_secs(1), CheckpointMode::Passive).is_err());
        assert!(CheckpointOptions::new(1, Duration::ZERO, CheckpointMode::Passive).is_err());
        assert!(CheckpointOptions::new(1, Duration::from_millis(1), CheckpointMode::Full).is_ok());
    }

    #[test]
    fn test_over_limit_checkpoints_once_at_configured_mode() {
        let backend = RecordingBackend::with_size(600_000);
        let manager =
            CheckpointManager::with_backend(backend.clone(), options(500_000, CheckpointMode::Passive));

        let result = manager.check_and_perform_checkpoint().unwrap();
        assert!(result.is_some());
        assert_eq!(backend.calls(), vec![CheckpointMode::Passive]);
    }

    #[test]
    fn test_under_limit_does_not_checkpoint() {
        let backend = RecordingBackend::with_size(400_000);
        let manager =
            CheckpointManager::with_backend(backend.clone(), options(500_000, CheckpointMode::Passive));

        assert!(manager.check_and_perform_checkpoint().unwrap().is_none());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_success_iff_not_busy() {
        for (busy, expected) in [(0, true), (1, false), (5, false)] {
            let backend = RecordingBackend::with_size(0);
            backend.busy.store(busy, Ordering::SeqCst);
            let manager =
                CheckpointManager::with_backend(backend.clone(), options(1, CheckpointMode::Full));

            let result = manager.perform_checkpoint(CheckpointMode::Full).unwrap();
            assert_eq!(result.success, expected, "busy = {busy}");
            assert_eq!(result.total_pages, 10);
            assert_eq!(result.modified_pages, 7);
        }
    }

    #[test]
    fn test_force_uses_truncate() {
        let backend = RecordingBackend::with_size(0);
        let manager =
            CheckpointManager::with_backend(backend.clone(), options(1, CheckpointMode::Passive));
        manager.force_checkpoint().unwrap();
        assert_eq!(backend.calls(), vec![CheckpointMode::Truncate]);
    }

    #[test]
    fn test_busy_is_not_escalated() {
        let backend = RecordingBackend::with_size(2);
        backend.busy.store(1, Ordering::SeqCst);
        let manager =
            CheckpointManager::with_backend(backend.clone(), options(1, CheckpointMode::Passive));

        let result = manager.check_and_perform_checkpoint().unwrap().unwrap();
        assert!(!result.success);
        assert_eq!(backend.calls(), vec![CheckpointMode::Passive]);
    }

    #[test]
    fn test_start_stop_idempotent() {
        let backend = RecordingBackend::with_size(0);
        let manager =
            CheckpointManager::with_backend(backend.clone(), options(1, CheckpointMode::Passive));

        manager.start().unwrap();
        manager.start().unwrap();
        assert!(manager.is_running());

        manager.stop();
        manager.stop();
        assert!(!manager.is_running());
    }

    #[test]
    fn test_background_monitor_checkpoints() {
        let backend = RecordingBackend::with_size(2_000);
        let manager =
            CheckpointManager::with_backend(backend.clone(), options(1_000, CheckpointMode::Passive));

        manager.start().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        manager.stop();

        let calls = backend.calls().len();
        assert!(calls >= 1, "expected at least one tick, got {calls}");

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(backend.calls().len(), calls, "no ticks after stop");
    }

    #[test]
    fn test_failed_tick_keeps_monitoring() {
        let backend = RecordingBackend::with_size(0);
        backend.fail_size.store(true, Ordering::SeqCst);
        let manager =
            CheckpointManager::with_backend(backend.clone(), options(1, CheckpointMode::Passive));

        manager.start().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert!(manager.is_running());
        manager.stop();

        assert!(backend.size_reads.load(Ordering::SeqCst) >= 2);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_not_initialized_before_initialize() {
        let db = Database::in_memory();
        let manager = CheckpointManager::new(db.state(), CheckpointOptions::default());

        assert!(matches!(
            manager.check_and_perform_checkpoint(),
            Err(StoreError::NotInitialized)
        ));
        assert!(matches!(
            manager.get_checkpoint_stats(),
            Err(StoreError::NotInitialized)
        ));
        assert!(matches!(
            manager.force_checkpoint(),
            Err(StoreError::NotInitialized)
        ));
    }

    #[test]
    fn test_missing_wal_file_is_zero() {
        let temp_dir = TempDir::new().unwrap();
        let state = Arc::new(ConnectionState::new());
        state
            .set(Arc::new(DbHandle::new(
                rusqlite::Connection::open_in_memory().unwrap(),
                Some(temp_dir.path().join("ghost.db")),
            )))
            .unwrap();

        let backend = SqliteCheckpointBackend::new(state);
        assert_eq!(backend.wal_size().unwrap(), 0);
    }

    #[test]
    fn test_forced_checkpoint_shrinks_wal() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::with_settings(
            DatabaseLocation::File(temp_dir.path().join("walden.db")),
            ConnectionSettings {
                // Keep the engine from checkpointing on its own
                auto_checkpoint_pages: 100_000,
                ..ConnectionSettings::default()
            },
        );
        let handle = db.initialize().unwrap();
        handle
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TABLE blobs (id INTEGER PRIMARY KEY, body TEXT);
                     WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 500)
                     INSERT INTO blobs (body) SELECT hex(randomblob(256)) FROM n;",
                )?;
                Ok(())
            })
            .unwrap();

        let manager = CheckpointManager::new(db.state(), options(1, CheckpointMode::Passive));
        let before = manager.get_checkpoint_stats().unwrap();
        assert_eq!(before.journal_mode, "wal");
        assert_eq!(before.auto_checkpoint_pages, 100_000);
        assert!(before.wal_size_bytes > 0);

        let result = manager.force_checkpoint().unwrap();
        assert!(result.success);

        let after = manager.get_checkpoint_stats().unwrap();
        assert!(after.wal_size_bytes <= before.wal_size_bytes);
        assert_eq!(after.wal_size_bytes, 0);
    }

    #[test]
    fn test_sqlite_checkpoint_every_mode() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("walden.db"));
        db.initialize().unwrap();
        let manager = CheckpointManager::new(db.state(), CheckpointOptions::default());

        for mode in CheckpointMode::LADDER {
            let result = manager.perform_checkpoint(mode).unwrap();
            assert!(result.success, "{mode} should not be busy on an idle db");
        }
    }

    proptest! {
        #[test]
        fn prop_no_checkpoint_within_limit(max in 1u64..10_000_000, below in 0u64..10_000_000) {
            let size = below.min(max);
            let backend = RecordingBackend::with_size(size);
            let manager = CheckpointManager::with_backend(backend.clone(), options(max, CheckpointMode::Full));

            prop_assert!(manager.check_and_perform_checkpoint().unwrap().is_none());
            prop_assert!(backend.calls().is_empty());
        }

        #[test]
        fn prop_one_checkpoint_over_limit(max in 1u64..10_000_000, excess in 1u64..10_000_000, mode_idx in 0usize..4) {
            let mode = CheckpointMode::LADDER[mode_idx];
            let backend = RecordingBackend::with_size(max + excess);
            let manager = CheckpointManager::with_backend(backend.clone(), options(max, mode));

            prop_assert!(manager.check_and_perform_checkpoint().unwrap().is_some());
            prop_assert_eq!(backend.calls(), vec![mode]);
        }

        #[test]
        fn prop_success_matches_busy(busy in 0i64..3) {
            let backend = RecordingBackend::with_size(0);
            backend.busy.store(busy, Ordering::SeqCst);
            let manager = CheckpointManager::with_backend(backend.clone(), options(1, CheckpointMode::Passive));
            let result = manager.perform_checkpoint(CheckpointMode::Restart).unwrap();
            prop_assert_eq!(result.success, busy == 0);
        }
    }
}
