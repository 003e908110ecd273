// doxguard/src/commands/scan.rs
//! The `scan` command: detect personal information in one text and, when a subject is
//! given, record it and print the escalation decision.
//!
//! License: MIT OR APACHE 2.0

use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use log::debug;
use std::fs;
use std::io::{self, Read, Write};

use doxguard_core::{FixedSanctions, Guard, ProcessOutcome};

use crate::cli::ScanCommand;
use crate::output::{self, info_msg};

pub fn run_scan(guard: &Guard, args: &ScanCommand, quiet: bool) -> Result<bool> {
    let text = read_input(args)?;
    debug!("Scanning {} byte(s) in scope '{}'.", text.len(), args.scope);

    let outcome = match &args.subject {
        Some(subject) => guard
            .process(subject, &args.scope, &text, &FixedSanctions(args.sanctions))
            .with_context(|| format!("Failed to process text for subject '{}'", subject))?,
        None => ProcessOutcome {
            scan: guard.scan(&text, &args.scope),
            decision: None,
            record_id: None,
            record_error: None,
        },
    };

    if args.json {
        output::print_json(&outcome)?;
    } else {
        print_outcome(&outcome, &text, args, quiet)?;
    }
    if let Some(e) = &outcome.record_error {
        anyhow::bail!("Detection shown above was not recorded: {}", e);
    }

    Ok(args.fail_on_detection && outcome.scan.detected)
}

fn read_input(args: &ScanCommand) -> Result<String> {
    match &args.input_file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn print_outcome(outcome: &ProcessOutcome, text: &str, args: &ScanCommand, quiet: bool) -> Result<()> {
    let color = output::stdout_color();
    let mut stdout = io::stdout().lock();
    let scan = &outcome.scan;

    if args.censor {
        write!(stdout, "{}", scan.censored_text(text))?;
        if !text.ends_with('\n') {
            writeln!(stdout)?;
        }
        stdout.flush()?;
        drop(stdout);
        if scan.detected && !quiet {
            info_msg(format!(
                "{} match(es), risk {}.",
                scan.matches.len(),
                output::risk_label(scan.risk_level, io::stderr().is_terminal())
            ));
        }
        return Ok(());
    }

    if !scan.detected {
        writeln!(stdout, "No personal information detected.")?;
        return Ok(());
    }

    writeln!(
        stdout,
        "Risk: {} (score {})",
        output::risk_label(scan.risk_level, color),
        scan.score
    )?;
    for category in scan.categories() {
        writeln!(stdout, "  {}: {} match(es)", category, scan.count_for(category))?;
    }
    for m in &scan.matches {
        writeln!(stdout, "  [{}..{}] {} {}", m.start, m.end, m.category, m.censored)?;
    }
    if let Some(decision) = &outcome.decision {
        writeln!(
            stdout,
            "Escalation: {} ({} recent detection(s), {} prior sanction(s))",
            output::tier_label(decision.tier, color),
            decision.subject_recent_detection_count,
            decision.subject_prior_sanction_count
        )?;
    }
    if let Some(id) = &outcome.record_id {
        writeln!(stdout, "Recorded as {}", id)?;
    }
    Ok(())
}
