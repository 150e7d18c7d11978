//! Optimization Service
//!
//! Aggregates analyzer output for the common queries into one report and
//! drives the engine's own statistics refresh. Scores come from the
//! analyzer unchanged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::analyzer::{QueryAnalysisResult, QueryAnalyzer, collect_index_suggestions, has_limit};
use crate::config::AnalysisConfig;
use crate::constants::analysis::HIGH_AVERAGE_SCORE;
use crate::storage::{ConnectionState, Maintenance};
use crate::types::Result;

/// A query over the slow threshold
#[derive(Debug, Clone, Serialize)]
pub struct SlowQuery {
    pub sql: String,
    pub execution_time_ms: f64,
    pub inefficiency_score: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub timestamp: DateTime<Utc>,
    pub queries_analyzed: usize,
    pub total_recommendations: usize,
    pub average_inefficiency_score: f64,
    pub slow_queries: Vec<SlowQuery>,
    pub missing_indexes: Vec<String>,
    pub optimization_suggestions: Vec<String>,
}

/// Cutoffs used while aggregating
#[derive(Debug, Clone, Copy)]
pub struct ReportThresholds {
    pub slow_query_ms: f64,
    pub large_result_rows: usize,
}

impl From<&AnalysisConfig> for ReportThresholds {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            slow_query_ms: config.slow_query_ms,
            large_result_rows: config.large_result_rows,
        }
    }
}

impl Default for ReportThresholds {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

/// Fold per-query results into a report.
pub fn build_report(results: &[QueryAnalysisResult], thresholds: ReportThresholds) -> OptimizationReport {
    let queries_analyzed = results.len();
    let total_recommendations = results.iter().map(|r| r.recommendations.len()).sum();
    let average_inefficiency_score = if results.is_empty() {
        0.0
    } else {
        results
            .iter()
            .map(|r| f64::from(r.inefficiency_score))
            .sum::<f64>()
            / queries_analyzed as f64
    };

    let slow_queries: Vec<SlowQuery> = results
        .iter()
        .filter(|r| r.execution_time_ms > thresholds.slow_query_ms)
        .map(|r| SlowQuery {
            sql: r.sql.clone(),
            execution_time_ms: r.execution_time_ms,
            inefficiency_score: r.inefficiency_score,
        })
        .collect();
    let missing_indexes = collect_index_suggestions(results);

    let mut optimization_suggestions = Vec::new();
    let unpaginated = results
        .iter()
        .filter(|r| r.rows_affected > thresholds.large_result_rows && !has_limit(&r.sql))
        .count();
    if unpaginated > 0 {
        optimization_suggestions.push(format!(
            "{} queries return more than {} rows without LIMIT; paginate large result sets",
            unpaginated, thresholds.large_result_rows
        ));
    }
    if !slow_queries.is_empty() {
        optimization_suggestions.push(format!(
            "{} queries exceed {}ms; review their plans and indexes",
            slow_queries.len(),
            thresholds.slow_query_ms
        ));
    }
    if average_inefficiency_score > HIGH_AVERAGE_SCORE {
        optimization_suggestions.push(format!(
            "Average inefficiency score is {:.1}; the schema likely lacks indexes for common access paths",
            average_inefficiency_score
        ));
    }
    if !missing_indexes.is_empty() {
        optimization_suggestions.push(format!(
            "Create the {} suggested indexes to remove full table scans",
            missing_indexes.len()
        ));
    }

    OptimizationReport {
        timestamp: Utc::now(),
        queries_analyzed,
        total_recommendations,
        average_inefficiency_score,
        slow_queries,
        missing_indexes,
        optimization_suggestions,
    }
}

pub struct OptimizationService {
    analyzer: QueryAnalyzer,
    maintenance: Maintenance,
    thresholds: ReportThresholds,
}

impl OptimizationService {
    pub fn new(state: Arc<ConnectionState>, thresholds: ReportThresholds) -> Self {
        Self {
            analyzer: QueryAnalyzer::new(Arc::clone(&state)),
            maintenance: Maintenance::new(state),
            thresholds,
        }
    }

    /// Report over the common query battery.
    pub fn generate_report(&self) -> Result<OptimizationReport> {
        let results = self.analyzer.analyze_common_queries()?;
        let report = build_report(&results, self.thresholds);
        info!(
            queries = report.queries_analyzed,
            average_score = report.average_inefficiency_score,
            missing_indexes = report.missing_indexes.len(),
            "Optimization report generated"
        );
        Ok(report)
    }

    /// Report, then refresh the planner's statistics.
    pub fn optimize(&self) -> Result<OptimizationReport> {
        let report = self.generate_report()?;
        self.maintenance.refresh_statistics()?;
        Ok(report)
    }
}
