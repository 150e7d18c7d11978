//! Connection Lifecycle
//!
//! Opens the database file, registers the handle in [`ConnectionState`]
//! and applies the foundational pragmas:
//! - WAL journal with NORMAL synchronous
//! - tuned page cache, in-memory temp store, busy timeout
//! - engine auto-checkpoint threshold
//! - foreign key enforcement
//!
//! `initialize()` is idempotent; `close()` is safe to call twice.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use super::state::{ConnectionState, DbHandle, SharedHandle};
use crate::config::{Config, ConfigLoader};
use crate::constants::{checkpoint, database};
use crate::types::{Result, StoreError};

/// Shared lifecycle handle for components and API handlers.
pub type SharedDatabase = Arc<Database>;

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

/// Pragma-level connection tuning
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Busy handler timeout
    pub busy_timeout: Duration,
    /// Page cache size in KiB
    pub cache_size_kib: i64,
    /// Engine auto-checkpoint threshold in pages
    pub auto_checkpoint_pages: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(database::DEFAULT_BUSY_TIMEOUT_MS),
            cache_size_kib: database::DEFAULT_CACHE_SIZE_KIB,
            auto_checkpoint_pages: checkpoint::DEFAULT_AUTO_CHECKPOINT_PAGES,
        }
    }
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            busy_timeout: Duration::from_millis(config.database.busy_timeout_ms),
            cache_size_kib: config.database.cache_size_kib,
            auto_checkpoint_pages: config.checkpoint.auto_checkpoint_pages,
        }
    }
}

/// Owner of the connection lifecycle.
pub struct Database {
    state: Arc<ConnectionState>,
    location: DatabaseLocation,
    settings: ConnectionSettings,
    /// Handle whose close was deferred because it was still borrowed
    retired: Mutex<Weak<DbHandle>>,
}

impl Database {
    /// Database backed by the file at `path` (not opened until `initialize()`).
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_settings(
            DatabaseLocation::File(path.as_ref().to_path_buf()),
            ConnectionSettings::default(),
        )
    }

    /// In-memory database for tests and tooling. There is no WAL file.
    pub fn in_memory() -> Self {
        Self::with_settings(DatabaseLocation::Memory, ConnectionSettings::default())
    }

    /// Database at the configured (or platform default) location.
    pub fn from_config(config: &Config) -> Result<Self> {
        let path = ConfigLoader::database_path(config)?;
        Ok(Self::with_settings(
            DatabaseLocation::File(path),
            ConnectionSettings::from_config(config),
        ))
    }

    pub fn with_settings(location: DatabaseLocation, settings: ConnectionSettings) -> Self {
        Self {
            state: Arc::new(ConnectionState::new()),
            location,
            settings,
            retired: Mutex::new(Weak::new()),
        }
    }

    /// Connection state shared with the other components.
    pub fn state(&self) -> Arc<ConnectionState> {
        Arc::clone(&self.state)
    }

    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    /// Live handle, or `StoreError::NotInitialized`.
    pub fn connection(&self) -> Result<SharedHandle> {
        self.state.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    /// Open the database if needed and return the live handle.
    pub fn initialize(&self) -> Result<SharedHandle> {
        if let Ok(handle) = self.state.get() {
            debug!("Database already initialized, reusing handle");
            return Ok(handle);
        }
        if self.retired_handle_alive() {
            return Err(StoreError::HandleInUse);
        }

        let (conn, path) = match &self.location {
            DatabaseLocation::File(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent)?;
                }
                (Connection::open(path)?, Some(path.clone()))
            }
            DatabaseLocation::Memory => (Connection::open_in_memory()?, None),
        };

        let handle = Arc::new(DbHandle::new(conn, path));
        match self.state.set(Arc::clone(&handle)) {
            Ok(()) => {}
            // Lost a race with another initializer; theirs wins.
            Err(StoreError::AlreadyInitialized) => return self.state.get(),
            Err(e) => return Err(e),
        }

        // Registered before configuring so helpers can resolve the handle.
        if let Err(e) = handle.with_conn(|conn| configure_connection(conn, &self.settings)) {
            self.state.clear();
            return Err(e);
        }

        info!(
            location = ?self.location,
            auto_checkpoint_pages = self.settings.auto_checkpoint_pages,
            "Database initialized"
        );
        Ok(handle)
    }

    /// Close the live handle. No-op when already closed.
    pub fn close(&self) -> Result<()> {
        let Some(handle) = self.state.clear() else {
            debug!("Database already closed");
            return Ok(());
        };

        match Arc::try_unwrap(handle) {
            Ok(handle) => handle.close()?,
            // Still borrowed by an in-flight operation; the connection
            // closes when that last reference drops.
            Err(handle) => {
                debug!("Handle still borrowed, deferring close");
                *self
                    .retired
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::downgrade(&handle);
            }
        }

        info!("Database closed");
        Ok(())
    }

    fn retired_handle_alive(&self) -> bool {
        self.retired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .strong_count()
            > 0
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close database on drop: {}", e);
        }
    }
}

/// Apply production pragmas to a freshly opened connection.
fn configure_connection(conn: &mut Connection, settings: &ConnectionSettings) -> Result<()> {
    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!("journal_mode = {}", journal_mode);

    conn.execute_batch(
        r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
        "#,
    )?;
    conn.pragma_update(None, "cache_size", -settings.cache_size_kib.abs())?;
    conn.busy_timeout(settings.busy_timeout)?;
    conn.pragma_update(None, "wal_autocheckpoint", settings.auto_checkpoint_pages)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(())
}

/// Execute a function within a panic-safe transaction.
///
/// Commits when `f` returns `Ok`. An `Err` or a panic rolls everything back;
/// a panic is converted into `StoreError::Storage`.
pub fn run_in_transaction<F, T>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction()?;

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&tx)));

    match result {
        Ok(Ok(value)) => {
            tx.commit()?;
            Ok(value)
        }
        // Transaction is rolled back on drop
        Ok(Err(e)) => Err(e),
        Err(panic_payload) => {
            let panic_msg = panic_payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "Unknown panic".to_string());

            tracing::error!("Transaction panicked: {}", panic_msg);
            Err(StoreError::Storage(format!(
                "Transaction panicked: {}",
                panic_msg
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pragma_i64(handle: &SharedHandle, name: &str) -> i64 {
        handle
            .with_conn(|conn| Ok(conn.pragma_query_value(None, name, |row| row.get(0))?))
            .unwrap()
    }

    #[test]
    fn test_initialize_applies_pragmas() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("nested/dir/walden.db"));
        let handle = db.initialize().expect("Failed to initialize");

        let journal_mode: String = handle
            .with_conn(|conn| Ok(conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");
        assert_eq!(pragma_i64(&handle, "foreign_keys"), 1);
        assert_eq!(pragma_i64(&handle, "wal_autocheckpoint"), 1000);
        assert_eq!(pragma_i64(&handle, "cache_size"), -64000);
        assert!(temp_dir.path().join("nested/dir/walden.db").exists());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let db = Database::in_memory();
        let first = db.initialize().unwrap();
        let second = db.initialize().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_close_is_safe_twice() {
        let db = Database::in_memory();
        db.initialize().unwrap();
        db.close().unwrap();
        assert!(!db.is_initialized());
        db.close().unwrap();
        assert!(matches!(db.connection(), Err(StoreError::NotInitialized)));
    }

    #[test]
    fn test_reinitialize_after_close() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("walden.db"));
        let handle = db.initialize().unwrap();
        handle
            .with_conn(|conn| Ok(conn.execute_batch("CREATE TABLE t (x INTEGER)")?))
            .unwrap();
        drop(handle);
        db.close().unwrap();

        let handle = db.initialize().unwrap();
        let count: i64 = handle
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = 't'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_reinitialize_waits_for_deferred_close() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("walden.db"));
        let borrowed = db.initialize().unwrap();
        db.close().unwrap();
        assert!(!db.is_initialized());

        assert!(matches!(db.initialize(), Err(StoreError::HandleInUse)));
        assert!(!db.is_initialized());

        drop(borrowed);
        let handle = db.initialize().unwrap();
        assert_eq!(Arc::strong_count(&handle), 2);
    }

    #[test]
    fn test_open_failure_propagates() {
        let temp_dir = TempDir::new().unwrap();
        // A directory cannot be opened as a database file
        let db = Database::new(temp_dir.path());
        assert!(db.initialize().is_err());
        assert!(!db.is_initialized());
    }

    #[test]
    fn test_custom_settings() {
        let db = Database::with_settings(
            DatabaseLocation::Memory,
            ConnectionSettings {
                busy_timeout: Duration::from_millis(250),
                cache_size_kib: 2048,
                auto_checkpoint_pages: 250,
            },
        );
        let handle = db.initialize().unwrap();
        assert_eq!(pragma_i64(&handle, "wal_autocheckpoint"), 250);
        assert_eq!(pragma_i64(&handle, "cache_size"), -2048);
    }

    #[test]
    fn test_transaction_panic_safety() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

        let result: Result<()> = run_in_transaction(&mut conn, |tx| {
            tx.execute("INSERT INTO t VALUES (1)", [])?;
            panic!("Intentional panic for testing");
        });

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("panicked"));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "panicked transaction must roll back");
    }

    #[test]
    fn test_transaction_error_rolls_back() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

        let result: Result<()> = run_in_transaction(&mut conn, |tx| {
            tx.execute("INSERT INTO t VALUES (1)", [])?;
            Err(StoreError::Storage("stop".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
