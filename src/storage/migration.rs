//! Migration Runner
//!
//! Applies numbered SQL scripts (`001-initial.sql`, `002-...`) against the
//! schema version kept in SQLite's `user_version` header slot.
//!
//! ```text
//! Discover -> Diagnose -> Validate -> Apply -> (Committed | RolledBack)
//! ```
//!
//! Pending scripts must continue the current version without gaps. All of
//! them run in one transaction and the version is bumped after each script,
//! so schema and version always roll back together.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use tracing::{debug, error, info};

use super::lifecycle::run_in_transaction;
use super::state::ConnectionState;
use crate::constants::migration::{DIR_NAME, FILENAME_PATTERN};
use crate::types::{Result, ResultExt, StoreError};

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(FILENAME_PATTERN).expect("valid migration filename regex"));

/// One versioned, one-way schema change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub version: u32,
    pub filename: String,
    pub sql: String,
}

impl MigrationScript {
    pub fn new(version: u32, filename: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            filename: filename.into(),
            sql: sql.into(),
        }
    }
}

/// Outcome of a migration run
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    /// Filenames applied, in order
    pub applied: Vec<String>,
}

/// Read-only view of where the schema stands
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub current_version: u32,
    pub latest_version: u32,
    pub pending: Vec<String>,
    pub directory: PathBuf,
}

// =============================================================================
// Discovery
// =============================================================================

/// Parse the version prefix of a migration filename.
///
/// Returns `None` for files that are not versioned scripts.
pub fn parse_version(filename: &str) -> Option<Result<u32>> {
    let caps = FILENAME_RE.captures(filename)?;
    let digits = caps.get(1)?.as_str();
    Some(match digits.parse::<u32>() {
        Ok(0) => Err(StoreError::Config(format!(
            "Migration {} has version 0; versions start at 1",
            filename
        ))),
        Ok(version) => Ok(version),
        Err(_) => Err(StoreError::Config(format!(
            "Migration {} has an out-of-range version",
            filename
        ))),
    })
}

/// Load all versioned scripts from `dir`, sorted ascending by version.
///
/// Files that do not match `NNN-name.sql` are ignored. Duplicate versions
/// are a configuration error.
pub fn discover(dir: &Path) -> Result<Vec<MigrationScript>> {
    if !dir.is_dir() {
        return Err(StoreError::Config(format!(
            "Migrations directory not found: {}",
            dir.display()
        )));
    }

    let pattern = format!(
        "{}/*.sql",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let entries = glob::glob(&pattern).with_context("Invalid migrations glob")?;

    let mut by_version: BTreeMap<u32, MigrationScript> = BTreeMap::new();
    for entry in entries {
        let path = entry.with_context("Failed to read migrations directory")?;
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(version) = parse_version(filename) else {
            debug!("Ignoring non-migration file: {}", filename);
            continue;
        };
        let version = version?;

        let sql = std::fs::read_to_string(&path)?;
        let script = MigrationScript::new(version, filename, sql);
        if let Some(existing) = by_version.insert(version, script) {
            return Err(StoreError::Config(format!(
                "Duplicate migration version {}: {} and {}",
                version, existing.filename, filename
            )));
        }
    }

    Ok(by_version.into_values().collect())
}

/// Pick the migrations directory.
///
/// An explicit directory wins. Otherwise the development layout (crate
/// root) and the installed layout (next to the executable) are probed in
/// that order; when neither exists the development path is returned so the
/// error message names it.
pub fn resolve_migrations_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }

    let development = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(DIR_NAME);
    let installed = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join(DIR_NAME)));

    std::iter::once(development.clone())
        .chain(installed)
        .find(|candidate| candidate.is_dir())
        .unwrap_or(development)
}

// =============================================================================
// Planning and Applying
// =============================================================================

/// Scripts newer than `current`, checked to continue it without gaps.
pub fn plan_pending(current: u32, scripts: &[MigrationScript]) -> Result<Vec<&MigrationScript>> {
    let pending: Vec<&MigrationScript> = scripts.iter().filter(|s| s.version > current).collect();
    validate_sequence(current, &pending)?;
    Ok(pending)
}

/// The i-th pending script must be version `current + i + 1`.
pub fn validate_sequence(current: u32, pending: &[&MigrationScript]) -> Result<()> {
    for (i, script) in pending.iter().enumerate() {
        let expected = u32::try_from(i)
            .ok()
            .and_then(|i| current.checked_add(i + 1))
            .ok_or_else(|| StoreError::Config("Migration version overflow".to_string()))?;
        if script.version != expected {
            return Err(StoreError::MigrationSequence {
                expected,
                found: script.version,
                filename: script.filename.clone(),
            });
        }
    }
    Ok(())
}

/// Target the runner writes through. SQLite in production, a recorder in tests.
pub trait MigrationSink {
    /// Execute one script's SQL
    fn execute_script(&mut self, script: &MigrationScript) -> Result<()>;

    /// Persist the schema version after a script succeeded
    fn set_version(&mut self, version: u32) -> Result<()>;
}

/// Validate then apply every pending script through `sink`.
///
/// Nothing reaches the sink unless the whole pending run is valid. Returns
/// the applied scripts' filenames.
pub fn apply_migrations(
    current: u32,
    scripts: &[MigrationScript],
    sink: &mut dyn MigrationSink,
) -> Result<Vec<String>> {
    let pending = plan_pending(current, scripts)?;

    let mut applied = Vec::with_capacity(pending.len());
    for script in pending {
        let failed = |e: StoreError| StoreError::MigrationFailed {
            filename: script.filename.clone(),
            message: e.to_string(),
        };
        sink.execute_script(script).map_err(failed)?;
        sink.set_version(script.version).map_err(failed)?;
        debug!("Applied migration {} ({})", script.version, script.filename);
        applied.push(script.filename.clone());
    }
    Ok(applied)
}

/// Sink writing into an open transaction
struct TransactionSink<'a, 'conn> {
    tx: &'a Transaction<'conn>,
}

impl MigrationSink for TransactionSink<'_, '_> {
    fn execute_script(&mut self, script: &MigrationScript) -> Result<()> {
        self.tx.execute_batch(&script.sql)?;
        Ok(())
    }

    fn set_version(&mut self, version: u32) -> Result<()> {
        self.tx.pragma_update(None, "user_version", version)?;
        Ok(())
    }
}

/// Read the persisted schema version
pub fn read_user_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

// =============================================================================
// Runner
// =============================================================================

/// Applies scripts from a directory to the live connection.
pub struct MigrationRunner {
    state: Arc<ConnectionState>,
    dir: PathBuf,
}

impl MigrationRunner {
    pub fn new(state: Arc<ConnectionState>, dir: impl Into<PathBuf>) -> Self {
        Self {
            state,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persisted schema version
    pub fn current_version(&self) -> Result<u32> {
        self.state.with_conn(|conn| read_user_version(conn))
    }

    /// Current/latest version and the pending filenames, without writing.
    pub fn status(&self) -> Result<MigrationStatus> {
        let handle = self.state.get()?;
        let scripts = discover(&self.dir)?;
        let current_version = handle.with_conn(|conn| read_user_version(conn))?;
        let pending = plan_pending(current_version, &scripts)?
            .into_iter()
            .map(|s| s.filename.clone())
            .collect();

        Ok(MigrationStatus {
            current_version,
            latest_version: scripts.last().map_or(0, |s| s.version).max(current_version),
            pending,
            directory: self.dir.clone(),
        })
    }

    /// Apply all pending scripts atomically.
    pub fn run(&self) -> Result<MigrationReport> {
        let handle = self.state.get()?;
        let scripts = discover(&self.dir)?;

        handle.with_conn(|conn| {
            let from_version = read_user_version(conn)?;

            // Validate up front so an up-to-date schema never opens a transaction
            if plan_pending(from_version, &scripts)?.is_empty() {
                info!(version = from_version, "Schema up to date");
                return Ok(MigrationReport {
                    from_version,
                    to_version: from_version,
                    applied: Vec::new(),
                });
            }

            let result = run_in_transaction(conn, |tx| {
                let mut sink = TransactionSink { tx };
                apply_migrations(from_version, &scripts, &mut sink)
            });

            match result {
                Ok(applied) => {
                    let to_version = read_user_version(conn)?;
                    info!(
                        from = from_version,
                        to = to_version,
                        count = applied.len(),
                        "Migrations applied"
                    );
                    Ok(MigrationReport {
                        from_version,
                        to_version,
                        applied,
                    })
                }
                Err(e) => {
                    error!(version = from_version, "Migration rolled back: {}", e);
                    Err(e)
                }
            }
        })
    }
}
