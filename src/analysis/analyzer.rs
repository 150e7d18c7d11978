//! Query Analyzer
//!
//! Runs a statement once for timing, reads its `EXPLAIN QUERY PLAN`, and
//! turns the classified plan into a score, recommendations and concrete
//! `CREATE INDEX` statements.
//!
//! The statement runs inside a transaction that is always rolled back, so
//! analyzing an `INSERT` or `UPDATE` never changes the database.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{Connection, Statement, params_from_iter};
use serde::Serialize;
use tracing::{debug, info};

use super::plan::{
    AccessKind, ClassifiedStep, PlanStep, PlanSummary, classify_plan, summarize,
};
use crate::constants::analysis::{
    FULL_SCAN_PENALTY, LATENCY_TIERS, MAX_SCORE, NESTED_LOOP_PENALTY, TABLE_SCAN_PENALTY,
    TEMP_STRUCTURE_PENALTY,
};
use crate::storage::ConnectionState;
use crate::types::{Result, StoreError};

// =============================================================================
// SQL Text Patterns
// =============================================================================

static NON_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'(?:[^']|'')*'|--[^\n]*|(?s:/\*.*?\*/)").expect("valid literal regex")
});

static LIMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").expect("valid limit regex"));

static ORDER_BY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bORDER\s+BY\b").expect("valid order by regex"));

static TABLE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(FROM|JOIN)\s+([A-Za-z_]\w*)(?:\s+(?:AS\s+)?([A-Za-z_]\w*))?")
        .expect("valid table reference regex")
});

static CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(WHERE|ON|JOIN|ORDER\s+BY|GROUP\s+BY|LIMIT|HAVING|FROM|SELECT|UNION)\b")
        .expect("valid clause regex")
});

static PREDICATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\b([A-Za-z_]\w*)\.)?\b([A-Za-z_]\w*)\s*(?:=|<>|!=|<=|>=|<|>|\bIN\b|\bLIKE\b|\bIS\b|\bBETWEEN\b)",
    )
    .expect("valid predicate regex")
});

static JOIN_RHS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:=|<>|!=|<=|>=|<|>)\s*([A-Za-z_]\w*)\.([A-Za-z_]\w*)")
        .expect("valid join column regex")
});

/// Words the loose patterns above can mistake for names
const SQL_KEYWORDS: &[&str] = &[
    "AND", "AS", "BY", "CROSS", "GROUP", "HAVING", "INDEXED", "INNER", "IS", "JOIN", "LEFT",
    "LIMIT", "NATURAL", "NOT", "NULL", "ON", "OR", "ORDER", "OUTER", "RIGHT", "SET", "UNION",
    "USING", "VALUES", "WHERE", "WINDOW",
];

fn is_keyword(word: &str) -> bool {
    SQL_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// `sql` with string literals emptied and comments blanked, so keyword
/// patterns only see code.
pub fn strip_literals(sql: &str) -> Cow<'_, str> {
    NON_CODE_RE.replace_all(sql, |caps: &regex::Captures<'_>| {
        if caps[0].starts_with('\'') {
            "''"
        } else {
            " "
        }
    })
}

/// Whether the statement has a LIMIT clause outside literals and comments
pub fn has_limit(sql: &str) -> bool {
    LIMIT_RE.is_match(&strip_literals(sql))
}

// =============================================================================
// Result Types
// =============================================================================

/// Outcome of analyzing one statement
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnalysisResult {
    pub sql: String,
    pub parameters: Vec<serde_json::Value>,
    pub execution_time_ms: f64,
    /// Rows returned by a query, or rows changed by DML (rolled back)
    pub rows_affected: usize,
    pub plan: Vec<PlanStep>,
    pub summary: PlanSummary,
    pub recommendations: Vec<String>,
    pub index_suggestions: Vec<String>,
    pub inefficiency_score: u32,
}

/// Inefficiency score: plan penalties plus stacked latency tiers, capped.
pub fn inefficiency_score(summary: &PlanSummary, execution_time_ms: f64) -> u32 {
    let plan_penalty = summary
        .table_scans
        .saturating_mul(TABLE_SCAN_PENALTY)
        .saturating_add(summary.temp_structures.saturating_mul(TEMP_STRUCTURE_PENALTY))
        .saturating_add(summary.nested_loops.saturating_mul(NESTED_LOOP_PENALTY))
        .saturating_add(summary.full_scan_markers.saturating_mul(FULL_SCAN_PENALTY));

    let latency_penalty: u32 = LATENCY_TIERS
        .iter()
        .filter(|(threshold, _)| execution_time_ms > *threshold)
        .map(|(_, penalty)| penalty)
        .sum();

    plan_penalty.saturating_add(latency_penalty).min(MAX_SCORE)
}

// =============================================================================
// Parameters
// =============================================================================

/// Bind value from a JSON parameter.
pub fn param_from_json(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or(0.0)),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn param_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::json!(i),
        Value::Real(f) => serde_json::json!(f),
        Value::Text(s) => serde_json::json!(s),
        Value::Blob(b) => serde_json::json!(format!("<blob {} bytes>", b.len())),
    }
}

// =============================================================================
// Common Queries
// =============================================================================

struct CommonQuery {
    label: &'static str,
    sql: &'static str,
    params: &'static [i64],
}

/// Representative statements of the application's hot paths
const COMMON_QUERIES: [CommonQuery; 3] = [
    CommonQuery {
        label: "active personalities",
        sql: "SELECT * FROM personalities WHERE is_active = 1 ORDER BY name",
        params: &[],
    },
    CommonQuery {
        label: "agents of a personality (paged)",
        sql: "SELECT * FROM agents WHERE personality_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
        params: &[1, 20, 0],
    },
    CommonQuery {
        label: "active personalities with agents",
        sql: "SELECT DISTINCT p.* FROM personalities p JOIN agents a ON a.personality_id = p.id WHERE p.is_active = 1 AND a.is_active = 1",
        params: &[],
    },
];

// =============================================================================
// Analyzer
// =============================================================================

pub struct QueryAnalyzer {
    state: Arc<ConnectionState>,
}

impl QueryAnalyzer {
    pub fn new(state: Arc<ConnectionState>) -> Self {
        Self { state }
    }

    /// Execute `sql` once (rolled back), read its plan and score it.
    pub fn analyze_query(&self, sql: &str, params: &[Value]) -> Result<QueryAnalysisResult> {
        let result = self.state.with_conn(|conn| {
            let tx = conn.transaction()?;
            // Prepared first so syntax errors carry offsets into `sql` itself.
            // The plan is read before execution while the schema is unchanged.
            let mut stmt = tx.prepare(sql).map_err(|e| StoreError::query(sql, e))?;
            let steps = explain(&tx, sql, params)?;
            let (execution_time_ms, rows_affected) = execute_timed(&mut stmt, sql, params)?;
            drop(stmt);

            let plan = classify_plan(&steps);
            let summary = summarize(&plan);
            let code = strip_literals(sql);
            let tables = SqlTables::parse(&code);
            let (recommendations, index_suggestions) =
                recommend(&tx, &code, &plan, &tables)?;
            tx.rollback()?;

            Ok(QueryAnalysisResult {
                sql: sql.to_string(),
                parameters: params.iter().map(param_to_json).collect(),
                execution_time_ms,
                rows_affected,
                plan: steps,
                summary,
                recommendations,
                index_suggestions,
                inefficiency_score: inefficiency_score(&summary, execution_time_ms),
            })
        })?;

        debug!(
            score = result.inefficiency_score,
            time_ms = result.execution_time_ms,
            rows = result.rows_affected,
            "Analyzed query"
        );
        Ok(result)
    }

    /// Analyze the built-in battery of representative queries.
    pub fn analyze_common_queries(&self) -> Result<Vec<QueryAnalysisResult>> {
        let mut results = Vec::with_capacity(COMMON_QUERIES.len());
        for query in &COMMON_QUERIES {
            let params: Vec<Value> = query.params.iter().map(|p| Value::Integer(*p)).collect();
            let result = self.analyze_query(query.sql, &params)?;
            debug!(query = query.label, score = result.inefficiency_score, "Common query");
            results.push(result);
        }
        info!(count = results.len(), "Analyzed common queries");
        Ok(results)
    }

    /// Distinct index statements implied by the common queries.
    pub fn suggest_missing_indexes(&self) -> Result<Vec<String>> {
        Ok(collect_index_suggestions(&self.analyze_common_queries()?))
    }
}

/// Index statements across results, first-seen order, no duplicates.
pub fn collect_index_suggestions(results: &[QueryAnalysisResult]) -> Vec<String> {
    let mut suggestions: Vec<String> = Vec::new();
    for statement in results.iter().flat_map(|r| &r.index_suggestions) {
        if !suggestions.contains(statement) {
            suggestions.push(statement.clone());
        }
    }
    suggestions
}

fn execute_timed(stmt: &mut Statement<'_>, sql: &str, params: &[Value]) -> Result<(f64, usize)> {
    let start = Instant::now();

    let rows = if stmt.column_count() > 0 {
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| StoreError::query(sql, e))?;
        let mut count = 0;
        while rows.next().map_err(|e| StoreError::query(sql, e))?.is_some() {
            count += 1;
        }
        count
    } else {
        stmt.execute(params_from_iter(params.iter()))
            .map_err(|e| StoreError::query(sql, e))?
    };

    Ok((start.elapsed().as_secs_f64() * 1000.0, rows))
}

fn explain(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<PlanStep>> {
    let explain_sql = format!("EXPLAIN QUERY PLAN {}", sql);
    let mut stmt = conn
        .prepare(&explain_sql)
        .map_err(|e| StoreError::query(sql, e))?;
    let steps = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok(PlanStep::new(row.get(0)?, row.get(1)?, row.get::<_, String>(3)?))
        })
        .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| StoreError::query(sql, e))?;
    Ok(steps)
}

// =============================================================================
// Recommendations
// =============================================================================

/// Tables named in FROM/JOIN and the aliases that refer to them.
#[derive(Debug, Default)]
struct SqlTables {
    primary: Option<String>,
    by_name: HashMap<String, String>,
}

impl SqlTables {
    fn parse(sql: &str) -> Self {
        let mut tables = Self::default();
        for caps in TABLE_REF_RE.captures_iter(sql) {
            let table = caps[2].to_string();
            if is_keyword(&table) {
                continue;
            }
            if tables.primary.is_none() && caps[1].eq_ignore_ascii_case("FROM") {
                tables.primary = Some(table.clone());
            }
            tables
                .by_name
                .insert(table.to_ascii_lowercase(), table.clone());
            if let Some(alias) = caps.get(3).map(|m| m.as_str())
                && !is_keyword(alias)
            {
                tables.by_name.insert(alias.to_ascii_lowercase(), table);
            }
        }
        tables
    }

    /// Real table behind a plan name or alias
    fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map_or(name, String::as_str)
    }
}

/// `(table, column)` pairs used in WHERE and ON predicates, in order.
fn predicate_columns(sql: &str, tables: &SqlTables) -> Vec<(String, String)> {
    let clauses: Vec<_> = CLAUSE_RE.find_iter(sql).collect();
    let mut columns = Vec::new();

    for (i, clause) in clauses.iter().enumerate() {
        let keyword = clause.as_str();
        if !keyword.eq_ignore_ascii_case("WHERE") && !keyword.eq_ignore_ascii_case("ON") {
            continue;
        }
        let end = clauses.get(i + 1).map_or(sql.len(), |next| next.start());
        let segment = &sql[clause.end()..end];

        let mut push = |qualifier: Option<&str>, column: &str| {
            if is_keyword(column) {
                return;
            }
            let table = match qualifier {
                Some(q) => tables.resolve(q).to_string(),
                None => match &tables.primary {
                    Some(primary) => primary.clone(),
                    None => return,
                },
            };
            let pair = (table, column.to_string());
            if !columns.contains(&pair) {
                columns.push(pair);
            }
        };

        for caps in PREDICATE_RE.captures_iter(segment) {
            push(caps.get(1).map(|m| m.as_str()), &caps[2]);
        }
        for caps in JOIN_RHS_RE.captures_iter(segment) {
            push(Some(&caps[1]), &caps[2]);
        }
    }
    columns
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<std::result::Result<_, _>>()?;
    Ok(names)
}

/// `CREATE INDEX` for the filter columns of `table`, if any are known.
fn index_statement(
    conn: &Connection,
    table: &str,
    predicates: &[(String, String)],
) -> Result<Option<String>> {
    let existing = table_columns(conn, table)?;
    let columns: Vec<&str> = predicates
        .iter()
        .filter(|(t, _)| t.eq_ignore_ascii_case(table))
        .map(|(_, c)| c.as_str())
        .filter(|c| existing.iter().any(|e| e.eq_ignore_ascii_case(c)))
        .collect();

    if columns.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!(
        "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({})",
        table,
        columns.join("_"),
        table,
        columns.join(", ")
    )))
}

/// Recommendations and index statements; `code` has literals stripped.
fn recommend(
    conn: &Connection,
    code: &str,
    plan: &[ClassifiedStep],
    tables: &SqlTables,
) -> Result<(Vec<String>, Vec<String>)> {
    let predicates = predicate_columns(code, tables);
    let mut recommendations: Vec<String> = Vec::new();
    let mut index_suggestions: Vec<String> = Vec::new();
    let add = |list: &mut Vec<String>, text: String| {
        if !list.contains(&text) {
            list.push(text);
        }
    };

    let mut any_table_scan = false;
    let mut any_temp = false;

    for step in plan {
        if let Some(name) = step.class.unindexed_table() {
            any_table_scan = true;
            let table = tables.resolve(name);
            let how = match step.class.access.as_ref().map(|a| a.kind) {
                Some(AccessKind::AutomaticIndex) => "through a temporary automatic index",
                _ => "with a full scan",
            };
            match index_statement(conn, table, &predicates)? {
                Some(statement) => {
                    add(
                        &mut recommendations,
                        format!(
                            "Table '{}' is read {}; add an index on its filter columns: {}",
                            table, how, statement
                        ),
                    );
                    add(&mut index_suggestions, statement);
                }
                None => add(
                    &mut recommendations,
                    format!(
                        "Table '{}' is read {}; consider an index on the columns it is filtered or joined by",
                        table, how
                    ),
                ),
            }
        }

        if step.class.temp_structure {
            any_temp = true;
            add(
                &mut recommendations,
                "Query builds a temporary B-tree; consider restructuring it to avoid the extra sort, grouping or DISTINCT pass".to_string(),
            );
        }

        if step.class.nested_loop {
            let table = step
                .class
                .access
                .as_ref()
                .map_or("joined table", |a| tables.resolve(&a.table));
            add(
                &mut recommendations,
                format!(
                    "Nested loop join over '{}'; index the columns it is joined on",
                    table
                ),
            );
        }
    }

    if any_temp && ORDER_BY_RE.is_match(code) {
        add(
            &mut recommendations,
            "ORDER BY needs a temporary sort; an index matching the ORDER BY columns would avoid it".to_string(),
        );
    }
    if any_table_scan && !LIMIT_RE.is_match(code) {
        add(
            &mut recommendations,
            "Query scans a whole table and has no LIMIT; add a LIMIT to cap the result size".to_string(),
        );
    }

    Ok((recommendations, index_suggestions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, MigrationRunner};
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::path::Path;

    fn database_with(sql: &str) -> Database {
        let db = Database::in_memory();
        db.initialize()
            .unwrap()
            .with_conn(|conn| Ok(conn.execute_batch(sql)?))
            .unwrap();
        db
    }

    fn migrated() -> Database {
        let db = Database::in_memory();
        db.initialize().unwrap();
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        MigrationRunner::new(db.state(), dir).run().unwrap();
        db
    }

    #[test]
    fn test_unindexed_scan_with_sort() {
        let db = database_with(
            "CREATE TABLE t (x INTEGER, y INTEGER);
             INSERT INTO t VALUES (1, 2), (1, 1), (2, 3);",
        );
        let analyzer = QueryAnalyzer::new(db.state());
        let result = analyzer
            .analyze_query("SELECT * FROM t WHERE x=1 ORDER BY y", &[])
            .unwrap();

        assert!(result.inefficiency_score >= 50, "{:?}", result);
        assert_eq!(result.rows_affected, 2);
        assert_eq!(
            result.index_suggestions,
            vec!["CREATE INDEX IF NOT EXISTS idx_t_x ON t(x)"]
        );
        assert!(result.recommendations.iter().any(|r| r.contains("CREATE INDEX")));
        assert!(result.recommendations.iter().any(|r| r.contains("restructuring")));
        assert!(result.recommendations.iter().any(|r| r.contains("ORDER BY")));
        assert!(result.recommendations.iter().any(|r| r.contains("LIMIT")));
    }

    #[test]
    fn test_indexed_lookup_scores_zero() {
        let db = database_with(
            "CREATE TABLE t (x INTEGER, y INTEGER);
             CREATE INDEX idx_t_x_y ON t(x, y);",
        );
        let result = QueryAnalyzer::new(db.state())
            .analyze_query("SELECT y FROM t WHERE x = ?1 ORDER BY y", &[Value::Integer(1)])
            .unwrap();
        assert_eq!(result.inefficiency_score, 0, "{:?}", result.plan);
        assert!(result.index_suggestions.is_empty());
        assert_eq!(result.parameters, vec![serde_json::json!(1)]);
    }

    #[test]
    fn test_dml_is_rolled_back() {
        let db = database_with("CREATE TABLE t (x INTEGER)");
        let analyzer = QueryAnalyzer::new(db.state());
        let result = analyzer
            .analyze_query("INSERT INTO t VALUES (?1)", &[Value::Integer(7)])
            .unwrap();
        assert_eq!(result.rows_affected, 1);

        let count: i64 = db
            .state()
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_malformed_sql_is_query_error() {
        let db = Database::in_memory();
        db.initialize().unwrap();
        let err = QueryAnalyzer::new(db.state())
            .analyze_query("SELEC * FROM nowhere", &[])
            .unwrap_err();
        match err {
            StoreError::Query { sql, .. } => assert_eq!(sql, "SELEC * FROM nowhere"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_requires_initialization() {
        let db = Database::in_memory();
        let result = QueryAnalyzer::new(db.state()).analyze_query("SELECT 1", &[]);
        assert!(matches!(result, Err(StoreError::NotInitialized)));
    }

    #[test]
    fn test_join_alias_resolution() {
        let tables = SqlTables::parse(
            "SELECT p.* FROM personalities p JOIN agents AS a ON a.personality_id = p.id WHERE p.is_active = 1",
        );
        assert_eq!(tables.primary.as_deref(), Some("personalities"));
        assert_eq!(tables.resolve("p"), "personalities");
        assert_eq!(tables.resolve("a"), "agents");
        assert_eq!(tables.resolve("agents"), "agents");

        let columns = predicate_columns(
            "SELECT p.* FROM personalities p JOIN agents AS a ON a.personality_id = p.id WHERE p.is_active = 1",
            &tables,
        );
        assert_eq!(
            columns,
            vec![
                ("agents".to_string(), "personality_id".to_string()),
                ("personalities".to_string(), "id".to_string()),
                ("personalities".to_string(), "is_active".to_string()),
            ]
        );
    }

    #[test]
    fn test_keywords_are_not_columns() {
        let sql = "SELECT * FROM t WHERE x IN (1, 2) AND NOT y IS NULL ORDER BY z";
        let columns = predicate_columns(sql, &SqlTables::parse(sql));
        assert_eq!(
            columns,
            vec![
                ("t".to_string(), "x".to_string()),
                ("t".to_string(), "y".to_string()),
            ]
        );
    }

    #[test]
    fn test_common_queries_run_on_bundled_schema() {
        let db = migrated();
        let analyzer = QueryAnalyzer::new(db.state());
        let results = analyzer.analyze_common_queries().unwrap();
        assert_eq!(results.len(), COMMON_QUERIES.len());
        assert!(results.iter().all(|r| r.inefficiency_score <= MAX_SCORE));

        let suggestions = analyzer.suggest_missing_indexes().unwrap();
        let unique: HashSet<&String> = suggestions.iter().collect();
        assert_eq!(unique.len(), suggestions.len());
    }

    #[test]
    fn test_ddl_is_analyzed_and_rolled_back() {
        let db = database_with(
            "CREATE TABLE t (x INTEGER);
             CREATE TABLE u (y INTEGER);",
        );
        let analyzer = QueryAnalyzer::new(db.state());
        analyzer
            .analyze_query("CREATE INDEX idx_t_x ON t(x)", &[])
            .unwrap();
        analyzer.analyze_query("DROP TABLE u", &[]).unwrap();

        let objects: i64 = db
            .state()
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('idx_t_x', 'u')",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(objects, 1, "index must not persist and table must survive");
    }

    #[test]
    fn test_engine_error_reports_offset() {
        let db = database_with("CREATE TABLE t (x INTEGER)");
        let err = QueryAnalyzer::new(db.state())
            .analyze_query("SELECT nope FROM t", &[])
            .unwrap_err();
        match err {
            StoreError::Query {
                message, offset, ..
            } => {
                assert_eq!(offset, Some(7));
                assert!(message.contains("no such column"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_limit_inside_literal_is_ignored() {
        let db = database_with("CREATE TABLE t (x INTEGER, y TEXT)");
        let result = QueryAnalyzer::new(db.state())
            .analyze_query("SELECT * FROM t WHERE y = 'no limit here'", &[])
            .unwrap();
        assert!(
            result.recommendations.iter().any(|r| r.contains("has no LIMIT")),
            "{:?}",
            result.recommendations
        );
        assert_eq!(
            result.index_suggestions,
            vec!["CREATE INDEX IF NOT EXISTS idx_t_y ON t(y)"]
        );
    }

    #[test]
    fn test_strip_literals() {
        assert_eq!(
            strip_literals("SELECT 'it''s LIMIT' -- LIMIT\nFROM t /* ORDER BY */"),
            "SELECT ''  \nFROM t  "
        );
        assert!(!has_limit("SELECT * FROM t WHERE y = 'limit 5'"));
        assert!(has_limit("SELECT * FROM t WHERE y = 'a' LIMIT 5"));
    }

    #[test]
    fn test_automatic_index_suggests_real_index() {
        let db = database_with(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, x INTEGER);
             CREATE TABLE u (id INTEGER PRIMARY KEY, x INTEGER);",
        );
        let result = QueryAnalyzer::new(db.state())
            .analyze_query("SELECT * FROM t, u WHERE t.x = u.x", &[])
            .unwrap();

        assert!(
            result.plan.iter().any(|s| s.detail.contains("AUTOMATIC")),
            "{:?}",
            result.plan
        );
        assert!(
            result
                .index_suggestions
                .contains(&"CREATE INDEX IF NOT EXISTS idx_u_x ON u(x)".to_string()),
            "{:?}",
            result.index_suggestions
        );
        assert!(result.summary.table_scans >= 2);
    }

    fn result_with(suggestions: &[&str]) -> QueryAnalysisResult {
        QueryAnalysisResult {
            sql: "SELECT 1".to_string(),
            parameters: Vec::new(),
            execution_time_ms: 0.0,
            rows_affected: 0,
            plan: Vec::new(),
            summary: PlanSummary::default(),
            recommendations: Vec::new(),
            index_suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
            inefficiency_score: 0,
        }
    }

    #[test]
    fn test_index_suggestions_deduped_in_order() {
        let a = "CREATE INDEX IF NOT EXISTS idx_p_is_active ON p(is_active)";
        let b = "CREATE INDEX IF NOT EXISTS idx_a_role_id ON a(role_id)";
        let merged = collect_index_suggestions(&[result_with(&[a]), result_with(&[b, a])]);
        assert_eq!(merged, vec![a, b]);
    }

    #[test]
    fn test_score_tiers_stack() {
        let none = PlanSummary::default();
        assert_eq!(inefficiency_score(&none, 50.0), 0);
        assert_eq!(inefficiency_score(&none, 150.0), 20);
        assert_eq!(inefficiency_score(&none, 600.0), 50);
        assert_eq!(inefficiency_score(&none, 1500.0), 90);

        let scan = PlanSummary {
            table_scans: 1,
            ..Default::default()
        };
        assert_eq!(inefficiency_score(&scan, 1500.0), 100);
    }

    #[test]
    fn test_param_from_json() {
        assert_eq!(param_from_json(&serde_json::json!(null)), Value::Null);
        assert_eq!(param_from_json(&serde_json::json!(true)), Value::Integer(1));
        assert_eq!(param_from_json(&serde_json::json!(3)), Value::Integer(3));
        assert_eq!(param_from_json(&serde_json::json!(2.5)), Value::Real(2.5));
        assert_eq!(
            param_from_json(&serde_json::json!("a")),
            Value::Text("a".to_string())
        );
    }

    fn summary_strategy() -> impl Strategy<Value = PlanSummary> {
        (0u32..20, 0u32..20, 0u32..20, 0u32..20).prop_map(|(a, b, c, d)| PlanSummary {
            table_scans: a,
            temp_structures: b,
            nested_loops: c,
            full_scan_markers: d,
        })
    }

    proptest! {
        #[test]
        fn test_score_is_capped(summary in summary_strategy(), ms in 0.0f64..5000.0) {
            prop_assert!(inefficiency_score(&summary, ms) <= MAX_SCORE);
        }

        #[test]
        fn test_score_monotonic_in_plan(summary in summary_strategy(), ms in 0.0f64..5000.0, which in 0usize..4) {
            let mut worse = summary;
            match which {
                0 => worse.table_scans += 1,
                1 => worse.temp_structures += 1,
                2 => worse.nested_loops += 1,
                _ => worse.full_scan_markers += 1,
            }
            prop_assert!(inefficiency_score(&worse, ms) >= inefficiency_score(&summary, ms));
        }

        #[test]
        fn test_score_monotonic_in_time(summary in summary_strategy(), ms in 0.0f64..5000.0, extra in 0.0f64..5000.0) {
            prop_assert!(inefficiency_score(&summary, ms + extra) >= inefficiency_score(&summary, ms));
        }
    }
}
