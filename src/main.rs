use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use walden_store::cli::commands::checkpoint::WalAction;
use walden_store::cli::commands::config::ConfigFormat;
use walden_store::cli::commands::{analyze, checkpoint, config, init, maintenance};
use walden_store::cli::{CommandContext, OutputFormat};
use walden_store::config::ConfigLoader;

#[derive(Parser)]
#[command(name = "walden")]
#[command(
    version,
    about = "Embedded SQLite store: migrations, WAL checkpoints and query analysis"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (overrides config and WALDEN_DATABASE__PATH)
    #[arg(long, global = true, env = "WALDEN_DB")]
    db: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply migrations
    Init,

    /// Apply pending schema migrations
    Migrate {
        #[arg(long, help = "Only show current and pending versions")]
        status: bool,
    },

    /// Run a WAL checkpoint
    Checkpoint {
        #[arg(long, help = "Mode: passive, full, restart, truncate")]
        mode: Option<String>,
        #[arg(long, help = "Truncate the WAL regardless of the configured mode")]
        force: bool,
        #[arg(long, help = "Show checkpoint statistics instead")]
        stats: bool,
    },

    /// Inspect or enable WAL journaling
    Wal {
        #[arg(value_enum, default_value_t = WalAction::Info)]
        action: WalAction,
    },

    /// Analyze one SQL statement (changes are rolled back)
    Analyze {
        sql: String,
        #[arg(long = "param", short = 'p', help = "Bind parameter (JSON or text), repeatable")]
        params: Vec<String>,
    },

    /// Optimization report over the common queries
    Report,

    /// Report, then refresh planner statistics
    Optimize,

    /// List indexes and unindexed foreign keys
    Indexes,

    /// Rebuild indexes (all, or of one table/index)
    Reindex { target: Option<String> },

    /// Rebuild the database file
    Vacuum,

    /// Page, size and row statistics
    Stats,

    /// Run the engine's integrity check
    Check,

    /// Run the checkpoint monitor in the foreground
    Watch {
        #[arg(long, help = "Stop after N seconds (default: run until killed)")]
        seconds: Option<u64>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show {
        #[arg(long = "as", value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
    },
    /// Show configuration and database paths
    Path,
    /// Write a default configuration file
    Init {
        #[arg(long, short, help = "Write the global config instead of the project one")]
        global: bool,
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

/// Setup panic handler for better error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mwalden encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Default hook prints the backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(true) => ExitCode::SUCCESS,
        // Failure already reported by the command
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Commands::Config { action } = &cli.command {
        match action {
            ConfigAction::Show { format } => config::show(&load_config(&cli)?, *format)?,
            ConfigAction::Path => config::path(&load_config(&cli)?)?,
            ConfigAction::Init { global, force } => config::init(*global, *force)?,
        }
        return Ok(true);
    }

    let ctx = CommandContext::load(cli.db.clone(), cli.format)?;
    let succeeded = match &cli.command {
        Commands::Init => init::run(&ctx)?,
        Commands::Migrate { status } => init::migrate(&ctx, *status)?,
        Commands::Checkpoint { mode, force, stats } => {
            checkpoint::run(&ctx, mode.as_deref(), *force, *stats)?
        }
        Commands::Wal { action } => checkpoint::wal(&ctx, *action)?,
        Commands::Analyze { sql, params } => analyze::run(&ctx, sql, params)?,
        Commands::Report => analyze::report(&ctx)?,
        Commands::Optimize => analyze::optimize(&ctx)?,
        Commands::Indexes => maintenance::indexes(&ctx)?,
        Commands::Reindex { target } => maintenance::reindex(&ctx, target.as_deref())?,
        Commands::Vacuum => maintenance::vacuum(&ctx)?,
        Commands::Stats => maintenance::stats(&ctx)?,
        Commands::Check => maintenance::check(&ctx)?,
        Commands::Watch { seconds } => checkpoint::watch(&ctx, *seconds)?,
        Commands::Config { .. } => true,
    };

    ctx.api.database().close()?;
    Ok(succeeded)
}

fn load_config(cli: &Cli) -> anyhow::Result<walden_store::Config> {
    let mut config = ConfigLoader::load()?;
    if cli.db.is_some() {
        config.database.path = cli.db.clone();
    }
    Ok(config)
}
