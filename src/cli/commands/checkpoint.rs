//! Checkpoint / WAL / Watch Commands
//!
//! Usage:
//!   walden checkpoint [--mode passive|full|restart|truncate] [--force] [--stats]
//!   walden wal [info|enable|status]
//!   walden watch [--seconds N]

use std::time::{Duration, Instant};

use crate::cli::ui::{Output, format_bytes};
use crate::cli::util::CommandContext;
use crate::storage::{CheckpointResult, CheckpointStats};
use crate::types::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum WalAction {
    /// File paths, size and auto-checkpoint threshold
    #[default]
    Info,
    /// Switch the journal to WAL mode
    Enable,
    /// Whether WAL is active and the file is within its limit
    Status,
}

pub fn run(ctx: &CommandContext, mode: Option<&str>, force: bool, stats: bool) -> Result<bool> {
    ctx.open()?;

    if stats {
        return ctx.emit(ctx.api.checkpoint_status(), |out, status| {
            out.section("Checkpoint");
            out.field("Monitoring", status.monitoring);
            out.field("Max WAL size", format_bytes(status.max_wal_size));
            print_stats(out, &status.stats);
        });
    }

    let response = if force {
        ctx.api.checkpoint_force()
    } else {
        ctx.api.checkpoint_trigger(mode)
    };
    ctx.emit(response, print_result)
}

pub fn wal(ctx: &CommandContext, action: WalAction) -> Result<bool> {
    ctx.open()?;

    match action {
        WalAction::Info => ctx.emit(ctx.api.wal_info(), |out, info| {
            out.section("WAL");
            if let Some(path) = &info.database_path {
                out.field("Database", path.display());
            }
            if let Some(path) = &info.wal_path {
                out.field("WAL file", path.display());
            }
            out.field("WAL size", format_bytes(info.wal_size_bytes));
            out.field("Journal mode", &info.journal_mode);
            out.field("Auto-checkpoint", format!("{} pages", info.auto_checkpoint_pages));
        }),
        WalAction::Enable => ctx.emit(ctx.api.wal_enable(), |out, change| {
            out.success(&format!("Journal mode is now {}", change.journal_mode));
        }),
        WalAction::Status => ctx.emit(ctx.api.wal_status(), |out, status| {
            if status.enabled {
                out.success("WAL journaling enabled");
            } else {
                out.warning(&format!("Journal mode is {}", status.journal_mode));
            }
            out.field(
                "WAL size",
                format!(
                    "{} of {}",
                    format_bytes(status.wal_size_bytes),
                    format_bytes(status.max_wal_size)
                ),
            );
            if status.over_limit {
                out.warning("WAL is over its limit; run `walden checkpoint`");
            }
        }),
    }
}

/// Run the checkpoint monitor in the foreground.
pub fn watch(ctx: &CommandContext, seconds: Option<u64>) -> Result<bool> {
    ctx.open()?;
    let manager = ctx.api.checkpoint_manager();
    let interval = manager.options().interval;
    manager.start()?;

    ctx.output.info(&format!(
        "Watching WAL every {}ms (limit {}, mode {})",
        interval.as_millis(),
        format_bytes(manager.options().max_wal_size),
        manager.options().mode
    ));

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    loop {
        let sleep_for = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                interval.min(deadline - now)
            }
            None => interval,
        };
        std::thread::sleep(sleep_for);

        match manager.get_checkpoint_stats() {
            Ok(stats) => tracing::debug!(wal_size = stats.wal_size_bytes, "WAL size"),
            Err(e) => tracing::warn!("Failed to read WAL stats: {}", e),
        }
    }

    manager.stop();
    ctx.emit(ctx.api.checkpoint_status(), |out, status| {
        out.success("Checkpoint monitor stopped");
        print_stats(out, &status.stats);
    })
}

fn print_result(out: &Output, result: &CheckpointResult) {
    if result.success {
        out.success("Checkpoint complete");
    } else {
        out.warning("Checkpoint blocked by an active connection; retry or use a stronger mode");
    }
    out.field("WAL frames", result.total_pages);
    out.field("Checkpointed frames", result.modified_pages);
}

fn print_stats(out: &Output, stats: &CheckpointStats) {
    out.field("WAL size", format_bytes(stats.wal_size_bytes));
    out.field("Auto-checkpoint", format!("{} pages", stats.auto_checkpoint_pages));
    out.field("Journal mode", &stats.journal_mode);
}
