//! Connection State
//!
//! Owns the single live SQLite handle. Every component holds an
//! `Arc<ConnectionState>` and borrows the handle per operation; nothing
//! else opens a connection.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use rusqlite::Connection;

use crate::constants::database::WAL_SUFFIX;
use crate::types::{Result, StoreError};

/// Shared reference to the live handle.
pub type SharedHandle = Arc<DbHandle>;

/// The live connection plus the file it was opened from.
///
/// `rusqlite::Connection` is `Send` but not `Sync`; the mutex lets the
/// caller's thread and the checkpoint thread take turns on it.
pub struct DbHandle {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl DbHandle {
    pub fn new(conn: Connection, path: Option<PathBuf>) -> Self {
        Self {
            conn: Mutex::new(conn),
            path,
        }
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Connection mutex poisoned, recovering");
            poisoned.into_inner()
        });
        f(&mut conn)
    }

    /// Database file path (`None` for in-memory databases)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// WAL sidecar path (`None` for in-memory databases)
    pub fn wal_path(&self) -> Option<PathBuf> {
        self.path.as_ref().map(|path| {
            let mut name = path.as_os_str().to_owned();
            name.push(WAL_SUFFIX);
            PathBuf::from(name)
        })
    }

    /// Close the underlying connection, surfacing engine errors.
    pub(crate) fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        conn.close().map_err(|(_, e)| StoreError::Database(e))
    }
}

impl std::fmt::Debug for DbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbHandle").field("path", &self.path).finish()
    }
}

/// Holder of at most one live [`DbHandle`].
#[derive(Debug, Default)]
pub struct ConnectionState {
    slot: RwLock<Option<SharedHandle>>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current handle, or `StoreError::NotInitialized`.
    pub fn get(&self) -> Result<SharedHandle> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(StoreError::NotInitialized)
    }

    /// Register a handle. Fails if one is already live.
    pub fn set(&self, handle: SharedHandle) -> Result<()> {
        let mut slot = self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return Err(StoreError::AlreadyInitialized);
        }
        *slot = Some(handle);
        Ok(())
    }

    /// Remove and return the live handle, if any.
    pub fn clear(&self) -> Option<SharedHandle> {
        self.slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn is_initialized(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Run `f` against the live connection.
    pub fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        self.get()?.with_conn(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_handle() -> SharedHandle {
        Arc::new(DbHandle::new(Connection::open_in_memory().unwrap(), None))
    }

    #[test]
    fn test_get_before_set_is_not_initialized() {
        let state = ConnectionState::new();
        assert!(!state.is_initialized());
        assert!(matches!(state.get(), Err(StoreError::NotInitialized)));
    }

    #[test]
    fn test_set_get_clear() {
        let state = ConnectionState::new();
        let handle = memory_handle();
        state.set(handle.clone()).unwrap();

        assert!(state.is_initialized());
        assert!(Arc::ptr_eq(&state.get().unwrap(), &handle));

        let cleared = state.clear().unwrap();
        assert!(Arc::ptr_eq(&cleared, &handle));
        assert!(state.clear().is_none());
        assert!(!state.is_initialized());
    }

    #[test]
    fn test_second_set_rejected() {
        let state = ConnectionState::new();
        state.set(memory_handle()).unwrap();
        assert!(matches!(
            state.set(memory_handle()),
            Err(StoreError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_with_conn_runs_against_live_handle() {
        let state = ConnectionState::new();
        state.set(memory_handle()).unwrap();
        let value: i64 = state
            .with_conn(|conn| Ok(conn.query_row("SELECT 41 + 1", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_wal_path() {
        let handle = DbHandle::new(
            Connection::open_in_memory().unwrap(),
            Some(PathBuf::from("/data/walden.db")),
        );
        assert_eq!(handle.wal_path(), Some(PathBuf::from("/data/walden.db-wal")));
        assert!(DbHandle::new(Connection::open_in_memory().unwrap(), None)
            .wal_path()
            .is_none());
    }
}
