//! Proctor Sentinel command-line tooling
//!
//! The `sentinel` command inspects the violation catalog, runs the detector
//! offline, replays scripted sessions and reads the audit trail.
//!
//! ## Commands
//!
//! - `catalog`: print every violation type with its severity and penalty
//! - `detect`: run the detector over a judgment JSON file
//! - `simulate`: drive a full session with a scripted oracle
//! - `audit`: print audit rows for a session from the configured store

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;

mod commands;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Proctor Sentinel exam integrity tooling", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the violation catalog
    Catalog,

    /// Run the detector over a judgment file
    Detect {
        /// Path to a judgment or raw analysis verdict (JSON)
        file: PathBuf,
    },

    /// Drive a session through a scripted oracle and print what a proctor sees
    Simulate {
        /// Path to a simulation script (JSON)
        script: PathBuf,

        /// Print only the final summary
        #[arg(long)]
        quiet: bool,
    },

    /// Print the audit trail of a session
    Audit {
        /// Session to show; lists known sessions when omitted
        session_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    sentinel_core::telemetry::init_tracing(cli.json && cli.verbose, level);

    match cli.command {
        Commands::Catalog => commands::cmd_catalog(cli.json),
        Commands::Detect { file } => commands::cmd_detect(&file, cli.json),
        Commands::Simulate { script, quiet } => {
            commands::cmd_simulate(&script, quiet, cli.json).await
        }
        Commands::Audit { session_id } => commands::cmd_audit(session_id.as_deref(), cli.json).await,
    }
}
