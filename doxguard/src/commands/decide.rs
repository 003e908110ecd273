// doxguard/src/commands/decide.rs
//! The `decide` command: an escalation decision from history alone, nothing recorded.

use anyhow::Result;
use std::io::{self, Write};

use doxguard_core::Guard;

use crate::cli::DecideCommand;
use crate::output;

pub fn run_decide(guard: &Guard, args: &DecideCommand) -> Result<bool> {
    let decision = guard.decide(&args.subject, &args.scope, args.risk, args.sanctions);
    if args.json {
        output::print_json(&decision)?;
        return Ok(false);
    }

    let color = output::stdout_color();
    writeln!(
        io::stdout(),
        "Tier: {} (risk {}, {} recent detection(s), {} prior sanction(s))",
        output::tier_label(decision.tier, color),
        output::risk_label(decision.triggering_risk_level, color),
        decision.subject_recent_detection_count,
        decision.subject_prior_sanction_count
    )?;
    Ok(false)
}
