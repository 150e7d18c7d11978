//! Analysis Commands
//!
//! Usage:
//!   walden analyze "<SQL>" [--param V]...
//!   walden report
//!   walden optimize

use crate::analysis::{OptimizationReport, QueryAnalysisResult};
use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::types::Result;

/// Parse a `--param` value: JSON when it parses, otherwise plain text.
pub fn parse_param(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

pub fn run(ctx: &CommandContext, sql: &str, params: &[String]) -> Result<bool> {
    ctx.open()?;
    let params: Vec<_> = params.iter().map(|p| parse_param(p)).collect();
    ctx.emit(ctx.api.analyze_query(sql, &params), print_analysis)
}

pub fn report(ctx: &CommandContext) -> Result<bool> {
    ctx.open()?;
    ctx.emit(ctx.api.optimization_report(), print_report)
}

pub fn optimize(ctx: &CommandContext) -> Result<bool> {
    ctx.open()?;
    ctx.emit(ctx.api.optimize(), |out, report| {
        print_report(out, report);
        out.success("Planner statistics refreshed");
    })
}

fn print_analysis(out: &Output, result: &QueryAnalysisResult) {
    out.section("Query Analysis");
    out.field("Score", format!("{}/100", result.inefficiency_score));
    out.field("Time", format!("{:.2}ms", result.execution_time_ms));
    out.field("Rows", result.rows_affected);

    out.section("Plan");
    for step in &result.plan {
        println!("  [{}<-{}] {}", step.id, step.parent, step.detail);
    }

    if !result.recommendations.is_empty() {
        out.section("Recommendations");
        for recommendation in &result.recommendations {
            out.item(recommendation);
        }
    }
    if !result.index_suggestions.is_empty() {
        out.section("Suggested Indexes");
        for statement in &result.index_suggestions {
            println!("  {};", statement);
        }
    }
}

fn print_report(out: &Output, report: &OptimizationReport) {
    out.header("Optimization Report");
    out.field("Generated", report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    out.field("Queries analyzed", report.queries_analyzed);
    out.field("Recommendations", report.total_recommendations);
    out.field(
        "Average score",
        format!("{:.1}", report.average_inefficiency_score),
    );

    if !report.slow_queries.is_empty() {
        out.section("Slow Queries");
        for slow in &report.slow_queries {
            out.item(&format!("{:.1}ms  {}", slow.execution_time_ms, slow.sql));
        }
    }
    if !report.missing_indexes.is_empty() {
        out.section("Missing Indexes");
        for statement in &report.missing_indexes {
            println!("  {};", statement);
        }
    }
    if report.optimization_suggestions.is_empty() {
        out.success("No optimization suggestions");
    } else {
        out.section("Suggestions");
        for suggestion in &report.optimization_suggestions {
            out.item(suggestion);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("42"), serde_json::json!(42));
        assert_eq!(parse_param("null"), serde_json::Value::Null);
        assert_eq!(parse_param("\"7\""), serde_json::json!("7"));
        assert_eq!(parse_param("alice"), serde_json::json!("alice"));
    }
}
