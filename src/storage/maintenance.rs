//! Database Maintenance
//!
//! Index inspection, REINDEX/VACUUM, statistics refresh and performance
//! counters over the shared connection.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use super::checkpoint::{CheckpointBackend, SqliteCheckpointBackend};
use super::migration::read_user_version;
use super::state::ConnectionState;
use crate::types::{Result, StoreError};

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableIndexes {
    pub table: String,
    pub indexes: Vec<IndexInfo>,
    /// Foreign key columns that no index leads with
    pub unindexed_foreign_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexAnalysis {
    pub tables: Vec<TableIndexes>,
    pub total_indexes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VacuumReport {
    pub size_before_bytes: i64,
    pub size_after_bytes: i64,
    pub reclaimed_bytes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub name: String,
    pub row_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub page_count: i64,
    pub page_size: i64,
    pub freelist_count: i64,
    pub database_size_bytes: i64,
    pub wal_size_bytes: u64,
    pub cache_size: i64,
    pub journal_mode: String,
    pub schema_version: u32,
    pub tables: Vec<TableStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityCheckResult {
    pub ok: bool,
    pub messages: Vec<String>,
}

/// Maintenance operations over the live connection
pub struct Maintenance {
    state: Arc<ConnectionState>,
}

impl Maintenance {
    pub fn new(state: Arc<ConnectionState>) -> Self {
        Self { state }
    }

    /// Indexes per user table plus foreign keys lacking an index.
    pub fn index_analysis(&self) -> Result<IndexAnalysis> {
        self.state.with_conn(|conn| {
            let mut tables = Vec::new();
            for table in user_tables(conn)? {
                let indexes = table_indexes(conn, &table)?;
                let unindexed_foreign_keys = foreign_key_columns(conn, &table)?
                    .into_iter()
                    .filter(|column| {
                        !indexes
                            .iter()
                            .any(|index| index.columns.first() == Some(column))
                    })
                    .collect();
                tables.push(TableIndexes {
                    table,
                    indexes,
                    unindexed_foreign_keys,
                });
            }

            let total_indexes = tables.iter().map(|t| t.indexes.len()).sum();
            Ok(IndexAnalysis {
                tables,
                total_indexes,
            })
        })
    }

    /// Rebuild all indexes, or those of one table/index.
    pub fn reindex(&self, target: Option<&str>) -> Result<()> {
        let sql = match target {
            Some(name) => {
                validate_identifier(name)?;
                format!("REINDEX \"{}\"", name)
            }
            None => "REINDEX".to_string(),
        };

        self.state.with_conn(|conn| {
            conn.execute_batch(&sql)?;
            Ok(())
        })?;
        info!(target = target.unwrap_or("*"), "Reindex complete");
        Ok(())
    }

    /// Rebuild the database file, returning its size before and after.
    pub fn vacuum(&self) -> Result<VacuumReport> {
        let report = self.state.with_conn(|conn| {
            let size_before_bytes = database_size(conn)?;
            conn.execute_batch("VACUUM")?;
            let size_after_bytes = database_size(conn)?;
            Ok(VacuumReport {
                size_before_bytes,
                size_after_bytes,
                reclaimed_bytes: size_before_bytes - size_after_bytes,
            })
        })?;
        info!(reclaimed = report.reclaimed_bytes, "Vacuum complete");
        Ok(report)
    }

    /// Let the engine refresh planner statistics.
    pub fn refresh_statistics(&self) -> Result<()> {
        self.state.with_conn(|conn| {
            conn.execute_batch("PRAGMA optimize; ANALYZE;")?;
            Ok(())
        })?;
        info!("Planner statistics refreshed");
        Ok(())
    }

    /// Page, size and row counters for diagnostics.
    pub fn performance_stats(&self) -> Result<PerformanceStats> {
        let wal_size_bytes = SqliteCheckpointBackend::new(Arc::clone(&self.state)).wal_size()?;

        self.state.with_conn(|conn| {
            let page_count = pragma_i64(conn, "page_count")?;
            let page_size = pragma_i64(conn, "page_size")?;
            let mut tables = Vec::new();
            for name in user_tables(conn)? {
                let row_count =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote(&name)), [], |row| {
                        row.get(0)
                    })?;
                tables.push(TableStats { name, row_count });
            }

            Ok(PerformanceStats {
                page_count,
                page_size,
                freelist_count: pragma_i64(conn, "freelist_count")?,
                database_size_bytes: page_count * page_size,
                wal_size_bytes,
                cache_size: pragma_i64(conn, "cache_size")?,
                journal_mode: conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?,
                schema_version: read_user_version(conn)?,
                tables,
            })
        })
    }

    /// `PRAGMA integrity_check`
    pub fn integrity_check(&self) -> Result<IntegrityCheckResult> {
        self.state.with_conn(|conn| {
            let mut stmt = conn.prepare("PRAGMA integrity_check")?;
            let messages: Vec<String> = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            let ok = messages.len() == 1 && messages[0] == "ok";
            Ok(IntegrityCheckResult { ok, messages })
        })
    }

    /// Switch to WAL journaling; returns the resulting journal mode.
    pub fn enable_wal(&self) -> Result<String> {
        let mode: String = self.state.with_conn(|conn| {
            Ok(conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?)
        })?;
        info!(journal_mode = %mode, "Journal mode set");
        Ok(mode)
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(StoreError::invalid_option(
            "identifier",
            format!("'{}' is not a plain table or index name", name),
        ))
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn pragma_i64(conn: &Connection, name: &str) -> Result<i64> {
    Ok(conn.pragma_query_value(None, name, |row| row.get(0))?)
}

fn database_size(conn: &Connection) -> Result<i64> {
    Ok(pragma_i64(conn, "page_count")? * pragma_i64(conn, "page_size")?)
}

fn user_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<_, _>>()?;
    Ok(names)
}

fn table_indexes(conn: &Connection, table: &str) -> Result<Vec<IndexInfo>> {
    let mut list = conn.prepare("SELECT name, \"unique\" FROM pragma_index_list(?1) ORDER BY name")?;
    let entries: Vec<(String, bool)> = list
        .query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<_, _>>()?;

    let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    let mut indexes = Vec::with_capacity(entries.len());
    for (name, unique) in entries {
        let columns = info
            .query_map([&name], |row| row.get::<_, Option<String>>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();
        indexes.push(IndexInfo {
            name,
            unique,
            columns,
        });
    }
    Ok(indexes)
}

fn foreign_key_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT \"from\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq")?;
    let columns = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<std::result::Result<_, _>>()?;
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    fn seeded() -> Database {
        let db = Database::in_memory();
        let handle = db.initialize().unwrap();
        handle
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TABLE parents (id INTEGER PRIMARY KEY, name TEXT UNIQUE);
                     CREATE TABLE children (
                         id INTEGER PRIMARY KEY,
                         parent_id INTEGER REFERENCES parents(id),
                         owner_id INTEGER REFERENCES parents(id)
                     );
                     CREATE INDEX idx_children_parent ON children(parent_id);
                     INSERT INTO parents (name) VALUES ('a'), ('b');
                     INSERT INTO children (parent_id, owner_id) VALUES (1, 2);",
                )?;
                Ok(())
            })
            .unwrap();
        db
    }

    #[test]
    fn test_index_analysis_flags_unindexed_fk() {
        let db = seeded();
        let analysis = Maintenance::new(db.state()).index_analysis().unwrap();

        let children = analysis
            .tables
            .iter()
            .find(|t| t.table == "children")
            .unwrap();
        assert_eq!(children.indexes.len(), 1);
        assert_eq!(children.indexes[0].columns, vec!["parent_id"]);
        assert_eq!(children.unindexed_foreign_keys, vec!["owner_id"]);

        let parents = analysis.tables.iter().find(|t| t.table == "parents").unwrap();
        assert!(parents.indexes.iter().any(|i| i.unique));
        assert_eq!(analysis.total_indexes, 2);
    }

    #[test]
    fn test_reindex_validates_identifier() {
        let db = seeded();
        let maintenance = Maintenance::new(db.state());
        maintenance.reindex(None).unwrap();
        maintenance.reindex(Some("children")).unwrap();
        assert!(maintenance.reindex(Some("children; DROP TABLE parents")).is_err());
    }

    #[test]
    fn test_performance_stats() {
        let db = seeded();
        let stats = Maintenance::new(db.state()).performance_stats().unwrap();
        assert!(stats.page_count > 0);
        assert_eq!(stats.database_size_bytes, stats.page_count * stats.page_size);
        assert_eq!(stats.wal_size_bytes, 0);
        let parents = stats.tables.iter().find(|t| t.name == "parents").unwrap();
        assert_eq!(parents.row_count, 2);
    }

    #[test]
    fn test_vacuum_and_integrity() {
        let db = seeded();
        let maintenance = Maintenance::new(db.state());
        let report = maintenance.vacuum().unwrap();
        assert!(report.size_after_bytes > 0);
        assert!(maintenance.integrity_check().unwrap().ok);
        maintenance.refresh_statistics().unwrap();
    }

    #[test]
    fn test_requires_initialization() {
        let db = Database::in_memory();
        let maintenance = Maintenance::new(db.state());
        assert!(matches!(maintenance.vacuum(), Err(StoreError::NotInitialized)));
        assert!(matches!(
            maintenance.performance_stats(),
            Err(StoreError::NotInitialized)
        ));
    }
}
