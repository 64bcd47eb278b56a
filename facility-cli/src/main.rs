//! Facility: registry → org-unit sync CLI.
//!
//! # Usage
//!
//! ```text
//! facility init --source-url <url> --target-url <url> [credentials] [--since <stamp>]
//! facility sync [--dry-run] [--json]
//! facility status [--json]
//! facility resolve <site-id>
//! facility daemon start|trigger [--dry-run]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, init::InitArgs, resolve::ResolveArgs, status::StatusArgs,
    sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "facility",
    version,
    about = "Incrementally sync a facility registry into an org-unit hierarchy",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the deployment config and seed both watermarks.
    Init(InitArgs),

    /// Run one pass: create new sites, update changed ones, notify.
    Sync(SyncArgs),

    /// Show the stored watermarks and the filters the next pass will use.
    Status(StatusArgs),

    /// Show the chain a site would need created, without writing anything.
    Resolve(ResolveArgs),

    /// Run or poke the trigger daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    if !matches!(cli.command, Commands::Daemon { .. }) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .format_target(false)
            .init();
    }
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Resolve(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
