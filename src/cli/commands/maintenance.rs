//! Maintenance Commands
//!
//! Usage:
//!   walden indexes
//!   walden reindex [TARGET]
//!   walden vacuum
//!   walden stats
//!   walden check

use crate::cli::ui::format_bytes;
use crate::cli::util::CommandContext;
use crate::types::Result;

pub fn indexes(ctx: &CommandContext) -> Result<bool> {
    ctx.open()?;
    ctx.emit(ctx.api.index_analysis(), |out, analysis| {
        out.header(&format!("Indexes ({})", analysis.total_indexes));
        for table in &analysis.tables {
            out.section(&table.table);
            if table.indexes.is_empty() {
                out.info("no indexes");
            }
            for index in &table.indexes {
                let unique = if index.unique { " UNIQUE" } else { "" };
                out.item(&format!("{}{} ({})", index.name, unique, index.columns.join(", ")));
            }
            for column in &table.unindexed_foreign_keys {
                out.warning(&format!("foreign key column '{}' has no index", column));
            }
        }
    })
}

pub fn reindex(ctx: &CommandContext, target: Option<&str>) -> Result<bool> {
    ctx.open()?;
    ctx.emit(ctx.api.reindex(target), |out, outcome| match &outcome.target {
        Some(target) => out.success(&format!("Rebuilt indexes of {}", target)),
        None => out.success("Rebuilt all indexes"),
    })
}

pub fn vacuum(ctx: &CommandContext) -> Result<bool> {
    ctx.open()?;
    ctx.emit(ctx.api.vacuum(), |out, report| {
        out.success("Vacuum complete");
        out.field("Before", format_bytes(report.size_before_bytes.max(0) as u64));
        out.field("After", format_bytes(report.size_after_bytes.max(0) as u64));
        out.field("Reclaimed", format_bytes(report.reclaimed_bytes.max(0) as u64));
    })
}

pub fn stats(ctx: &CommandContext) -> Result<bool> {
    ctx.open()?;
    ctx.emit(ctx.api.performance_stats(), |out, stats| {
        out.section("Database");
        out.field("Schema version", stats.schema_version);
        out.field("Journal mode", &stats.journal_mode);
        out.field("Size", format_bytes(stats.database_size_bytes.max(0) as u64));
        out.field("Pages", format!("{} x {} B", stats.page_count, stats.page_size));
        out.field("Free pages", stats.freelist_count);
        out.field("Cache size", stats.cache_size);
        out.field("WAL size", format_bytes(stats.wal_size_bytes));

        out.section("Tables");
        for table in &stats.tables {
            out.field(&table.name, table.row_count);
        }
    })
}

/// Fails the command when the engine reports corruption.
pub fn check(ctx: &CommandContext) -> Result<bool> {
    ctx.open()?;
    let response = ctx.api.integrity_check();
    let intact = response.data.as_ref().is_some_and(|result| result.ok);
    let succeeded = ctx.emit(response, |out, result| {
        if result.ok {
            out.success("Integrity check passed");
        } else {
            out.error(&format!("Integrity check found {} problems", result.messages.len()));
            for message in &result.messages {
                out.item(message);
            }
        }
    })?;
    Ok(succeeded && intact)
}
