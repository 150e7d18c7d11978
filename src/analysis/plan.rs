//! Plan Classifier
//!
//! Reads the rows SQLite emits for `EXPLAIN QUERY PLAN` and tags each step
//! with the patterns the scorer cares about. The detail text is the engine's
//! format, so all string matching against it lives in this file.
//!
//! Recognized detail forms (both the pre-3.36 `TABLE` wording and the
//! current one):
//! - `SCAN t` / `SCAN TABLE t`: full table scan
//! - `SCAN t USING [COVERING] INDEX i`: index scan
//! - `SEARCH t USING INDEX i (x=?)`: index lookup
//! - `SEARCH t USING AUTOMATIC [COVERING] INDEX (x=?)`: transient index the
//!   engine builds per run because no real one exists
//! - `USE TEMP B-TREE FOR ORDER BY|GROUP BY|DISTINCT`: temporary structure

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static TABLE_ACCESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(SCAN|SEARCH)(?: TABLE)? ([A-Za-z_][A-Za-z0-9_]*)(?: AS ([A-Za-z_][A-Za-z0-9_]*))?")
        .expect("valid table access regex")
});

/// Words that follow SCAN but are not table names
const NON_TABLE_TARGETS: &[&str] = &["CONSTANT", "SUBQUERY"];

/// One row of `EXPLAIN QUERY PLAN`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub id: i64,
    pub parent: i64,
    pub detail: String,
}

impl PlanStep {
    pub fn new(id: i64, parent: i64, detail: impl Into<String>) -> Self {
        Self {
            id,
            parent,
            detail: detail.into(),
        }
    }
}

/// How a step reaches its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    /// Reads every row with no index
    TableScan,
    /// Walks an index (or virtual table index) end to end
    IndexScan,
    /// Seeks through an index or the rowid
    Search,
    /// Seeks through an index the engine builds from a full scan per run
    AutomaticIndex,
}

/// A table touched by a plan step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableAccess {
    /// Name as printed in the plan (may be an alias)
    pub table: String,
    pub kind: AccessKind,
}

/// Patterns found in a single step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepClass {
    pub access: Option<TableAccess>,
    pub temp_structure: bool,
    pub full_scan_marker: bool,
    /// Set by [`classify_plan`]; a lone step cannot tell
    pub nested_loop: bool,
}

impl StepClass {
    /// Table name when the step reads a table without a real index
    pub fn unindexed_table(&self) -> Option<&str> {
        self.access
            .as_ref()
            .filter(|a| matches!(a.kind, AccessKind::TableScan | AccessKind::AutomaticIndex))
            .map(|a| a.table.as_str())
    }
}

/// A step and its classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedStep {
    pub step: PlanStep,
    pub class: StepClass,
}

/// Penalty-relevant counts over a whole plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub table_scans: u32,
    pub temp_structures: u32,
    pub nested_loops: u32,
    pub full_scan_markers: u32,
}

/// Classify one plan detail string in isolation.
pub fn classify_step(detail: &str) -> StepClass {
    let detail = detail.trim();
    StepClass {
        access: table_access(detail),
        temp_structure: detail.contains("USE TEMP B-TREE"),
        full_scan_marker: detail.contains("FULL SCAN"),
        nested_loop: detail.contains("NESTED LOOP"),
    }
}

fn table_access(detail: &str) -> Option<TableAccess> {
    let caps = TABLE_ACCESS_RE.captures(detail)?;
    let verb = caps.get(1)?.as_str();
    let name = caps.get(2)?.as_str();
    if NON_TABLE_TARGETS.contains(&name) {
        return None;
    }

    let kind = match verb {
        _ if detail.contains(" USING AUTOMATIC ") => AccessKind::AutomaticIndex,
        "SEARCH" => AccessKind::Search,
        _ if detail.contains(" USING ") || detail.contains("VIRTUAL TABLE INDEX") => {
            AccessKind::IndexScan
        }
        _ => AccessKind::TableScan,
    };

    // Newer engines print the alias alone; older ones print "t AS alias".
    let table = caps.get(3).map_or(name, |alias| alias.as_str());
    Some(TableAccess {
        table: table.to_string(),
        kind,
    })
}

/// Classify every step, marking inner join loops.
///
/// A table access that follows another table access under the same parent
/// is the inner side of a nested-loop join.
pub fn classify_plan(steps: &[PlanStep]) -> Vec<ClassifiedStep> {
    let mut seen_parents: Vec<i64> = Vec::new();

    steps
        .iter()
        .map(|step| {
            let mut class = classify_step(&step.detail);
            if class.access.is_some() {
                if seen_parents.contains(&step.parent) {
                    class.nested_loop = true;
                } else {
                    seen_parents.push(step.parent);
                }
            }
            ClassifiedStep {
                step: step.clone(),
                class,
            }
        })
        .collect()
}

/// Count the penalty-relevant patterns in a classified plan.
pub fn summarize(plan: &[ClassifiedStep]) -> PlanSummary {
    plan.iter().fold(PlanSummary::default(), |mut summary, s| {
        if s.class.unindexed_table().is_some() {
            summary.table_scans += 1;
        }
        if s.class.temp_structure {
            summary.temp_structures += 1;
        }
        if s.class.nested_loop {
            summary.nested_loops += 1;
        }
        if s.class.full_scan_marker {
            summary.full_scan_markers += 1;
        }
        summary
    })
}
