// doxguard/src/main.rs
//! doxguard entry point.
//!
//! Loads settings, opens the data directory and dispatches to the command handlers.
//! Exit codes: 0 on success, 1 when a command reports a failing result (for example
//! `scan --fail-on-detection` with a detection, or `guardian validate` with issues),
//! 2 on errors.

use anyhow::{Context, Result};
use clap::Parser;
use log::debug;
use std::path::PathBuf;
use std::process::ExitCode;

use doxguard::cli::{Cli, Commands, GuardianCommand};
use doxguard::commands::{decide, guardian, rules, scan};
use doxguard::logger;
use doxguard::output::error_msg;
use doxguard_core::{Guard, GuardConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init_logger(logger::level_for(cli.quiet, cli.debug));

    match run(cli).await {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::from(1),
        Err(e) => {
            error_msg(format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => GuardConfig::load_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => GuardConfig::load_default().context("Failed to load built-in settings")?,
    };

    let data_dir = resolve_data_dir(cli.data_dir.clone())?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    debug!("Using data directory {}", data_dir.display());

    let guard = Guard::open_dir(&data_dir, config);

    match &cli.command {
        Commands::Scan(args) => scan::run_scan(&guard, args, cli.quiet),
        Commands::Rules(command) => rules::run_rules(&guard, command, cli.quiet),
        Commands::Guardian(GuardianCommand::Watch { interval_secs }) => {
            guardian::run_watch(&guard, *interval_secs, cli.quiet).await
        }
        Commands::Guardian(command) => guardian::run_guardian(&guard, command, cli.quiet),
        Commands::Decide(args) => decide::run_decide(&guard, args),
    }
}

fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    dirs::data_dir()
        .map(|dir| dir.join("doxguard"))
        .context("Could not determine a data directory; pass --data-dir")
}
