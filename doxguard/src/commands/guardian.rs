// doxguard/src/commands/guardian.rs
//! The `guardian` command: validation, repair, maintenance and toggling of the
//! protected global rule.
//!
//! License: MIT OR APACHE 2.0

use anyhow::{Context, Result};
use log::info;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use doxguard_core::{ChangeReport, Guard, MaintenanceScheduler, ValidationReport};

use crate::cli::GuardianCommand;
use crate::output::{self, info_msg, warn_msg};

/// Runs every guardian subcommand except `watch`, which needs the async runtime.
pub fn run_guardian(guard: &Guard, command: &GuardianCommand, quiet: bool) -> Result<bool> {
    match command {
        GuardianCommand::Validate { json } => {
            let report = guard.validate();
            if *json {
                output::print_json(&report)?;
            } else {
                print_validation(&report)?;
            }
            Ok(!report.valid)
        }
        GuardianCommand::Repair { actor, json } => {
            let report = guard.repair(actor).context("Repair of the protected rule failed")?;
            if *json {
                output::print_json(&report)?;
            } else if report.repaired {
                writeln!(
                    io::stdout(),
                    "Repaired {} issue(s); {} remaining.",
                    report.issues_before.len(),
                    report.issues_after.len()
                )?;
            } else {
                writeln!(io::stdout(), "Nothing to repair.")?;
            }
            Ok(!report.issues_after.is_empty())
        }
        GuardianCommand::Maintain { json } => {
            let report = guard.run_maintenance().context("Maintenance cycle failed")?;
            if *json {
                output::print_json(&report)?;
            } else {
                writeln!(
                    io::stdout(),
                    "Found {} issue(s), fixed {}.",
                    report.issues_found,
                    report.issues_fixed
                )?;
            }
            Ok(!report.validation.valid && !report.repaired)
        }
        GuardianCommand::Toggle { enabled, aux, actor } => {
            let store = guard.store();
            let report = match aux {
                Some(kind) => store.set_auxiliary_enabled(*kind, *enabled, actor),
                None => store.set_protected_enabled(*enabled, actor),
            }
            .context("Failed to toggle the protected rule")?;
            print_toggle(&report, aux.map(|k| k.to_string()), *enabled, quiet)?;
            Ok(false)
        }
        GuardianCommand::Watch { .. } => {
            anyhow::bail!("'guardian watch' must be started through run_watch")
        }
    }
}

/// Runs scheduled maintenance until Ctrl-C.
pub async fn run_watch(guard: &Guard, interval_secs: u64, quiet: bool) -> Result<bool> {
    let interval = Duration::from_secs(interval_secs.max(1));
    if !quiet {
        info_msg(format!("Running maintenance every {}s. Press Ctrl-C to stop.", interval.as_secs()));
    }
    let handle = MaintenanceScheduler::spawn(guard.guardian().clone(), Arc::clone(guard.store()), interval);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    handle.abort();
    info!("Maintenance watch stopped.");
    Ok(false)
}

fn print_validation(report: &ValidationReport) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if report.valid {
        writeln!(stdout, "Protected rule is valid.")?;
    } else {
        writeln!(stdout, "Protected rule has {} issue(s):", report.issues.len())?;
        for issue in &report.issues {
            writeln!(stdout, "  - {}", issue)?;
        }
    }
    drop(stdout);
    for warning in &report.warnings {
        warn_msg(warning);
    }
    Ok(())
}

fn print_toggle(report: &ChangeReport, aux: Option<String>, enabled: bool, quiet: bool) -> Result<()> {
    let target = match &aux {
        Some(kind) => format!("Mention pattern '{}'", kind),
        None => "Protected rule".to_string(),
    };
    let state = if enabled { "enabled" } else { "disabled" };
    if report.changed {
        writeln!(io::stdout(), "{} {} (revision {}).", target, state, report.revision)?;
    } else {
        writeln!(io::stdout(), "{} already {}.", target, state)?;
    }
    if !enabled && !quiet {
        warn_msg("Platform identifiers are no longer excluded from detection until this is re-enabled.");
    }
    Ok(())
}
