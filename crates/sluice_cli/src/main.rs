//! Sluice CLI
//!
//! Command-line tools for operating on an action journal offline.
//!
//! # Commands
//!
//! - `inspect` - Show queue depth per priority and journal health
//! - `dump` - Print pending actions in drain order
//! - `sweep` - Preview or apply a retention sweep
//! - `verify` - Check journal frame integrity
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Sluice command-line journal tools.
#[derive(Parser)]
#[command(name = "sluice")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the action journal file
    #[arg(global = true, short, long)]
    journal: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show queue depth per priority and journal health
    Inspect,

    /// Print pending actions in drain order
    Dump {
        /// Maximum number of actions to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Preview or apply a retention sweep
    Sweep {
        /// Retention window in days
        #[arg(short, long, default_value = "7")]
        retention_days: u64,

        /// Actually evict instead of previewing
        #[arg(short, long)]
        apply: bool,
    },

    /// Check journal frame integrity
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect => {
            let journal = cli.journal.ok_or("Journal path required for inspect")?;
            commands::inspect::run(&journal)?;
        }
        Commands::Dump { limit, format } => {
            let journal = cli.journal.ok_or("Journal path required for dump")?;
            commands::dump::run(&journal, limit, &format)?;
        }
        Commands::Sweep {
            retention_days,
            apply,
        } => {
            let journal = cli.journal.ok_or("Journal path required for sweep")?;
            commands::sweep::run(&journal, retention_days, apply)?;
        }
        Commands::Verify => {
            let journal = cli.journal.ok_or("Journal path required for verify")?;
            commands::verify::run(&journal)?;
        }
        Commands::Version => {
            println!("Sluice CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
