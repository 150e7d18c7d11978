//! Init / Migrate Commands
//!
//! Usage:
//!   walden init
//!   walden migrate [--status]

use crate::cli::util::CommandContext;
use crate::storage::MigrationReport;
use crate::types::Result;

/// Open (creating if needed) the database and apply pending migrations.
pub fn run(ctx: &CommandContext) -> Result<bool> {
    let report = ctx.open()?;
    let path = ctx
        .api
        .database()
        .connection()?
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ":memory:".to_string());

    ctx.emit_ok(report, |out, report| {
        out.success(&format!("Database ready at {}", path));
        print_report(out, report);
    })
}

/// Apply pending migrations, or only show where the schema stands.
pub fn migrate(ctx: &CommandContext, status_only: bool) -> Result<bool> {
    ctx.open_unmigrated()?;

    if status_only {
        return ctx.emit(ctx.api.migration_status(), |out, status| {
            out.section("Migrations");
            out.field("Directory", status.directory.display());
            out.field("Current version", status.current_version);
            out.field("Latest version", status.latest_version);
            if status.pending.is_empty() {
                out.success("Schema is up to date");
            } else {
                out.info(&format!("{} pending:", status.pending.len()));
                for filename in &status.pending {
                    out.item(filename);
                }
            }
        });
    }

    let report = ctx.migrate()?;
    ctx.emit_ok(report, print_report)
}

fn print_report(out: &crate::cli::ui::Output, report: &MigrationReport) {
    if report.applied.is_empty() {
        out.info(&format!("Schema up to date (version {})", report.to_version));
        return;
    }
    out.success(&format!(
        "Migrated schema from version {} to {}",
        report.from_version, report.to_version
    ));
    for filename in &report.applied {
        out.item(filename);
    }
}
