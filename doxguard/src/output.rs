// doxguard/src/output.rs
//! Terminal output helpers: status messages on stderr and colored risk/tier labels.
//!
//! Colors are only emitted when the target stream is a terminal.
//!
//! License: MIT OR APACHE 2.0

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::io::{self, Write};

use doxguard_core::{EscalationTier, RiskLevel};

/// Helper for printing informational messages to stderr.
pub fn info_msg(msg: impl AsRef<str>) {
    let color = io::stderr().is_terminal();
    let _ = print_tagged(&mut io::stderr(), "INFO", msg.as_ref(), color, Tag::Info);
}

/// Helper for printing warning messages to stderr.
pub fn warn_msg(msg: impl AsRef<str>) {
    let color = io::stderr().is_terminal();
    let _ = print_tagged(&mut io::stderr(), "WARN", msg.as_ref(), color, Tag::Warn);
}

/// Helper for printing error messages to stderr.
pub fn error_msg(msg: impl AsRef<str>) {
    let color = io::stderr().is_terminal();
    let _ = print_tagged(&mut io::stderr(), "ERROR", msg.as_ref(), color, Tag::Error);
}

#[derive(Clone, Copy)]
enum Tag {
    Info,
    Warn,
    Error,
}

fn print_tagged<W: Write>(writer: &mut W, label: &str, msg: &str, color: bool, tag: Tag) -> io::Result<()> {
    let prefix = format!("[doxguard] {}:", label);
    if !color {
        return writeln!(writer, "{} {}", prefix, msg);
    }
    match tag {
        Tag::Info => writeln!(writer, "{} {}", prefix.cyan(), msg),
        Tag::Warn => writeln!(writer, "{} {}", prefix.yellow(), msg),
        Tag::Error => writeln!(writer, "{} {}", prefix.red().bold(), msg),
    }
}

/// Renders a risk level, colored by severity when `color` is set.
pub fn risk_label(level: RiskLevel, color: bool) -> String {
    let text = level.to_string();
    if !color {
        return text;
    }
    match level {
        RiskLevel::None => text.dimmed().to_string(),
        RiskLevel::Low => text.green().to_string(),
        RiskLevel::Medium => text.yellow().to_string(),
        RiskLevel::High => text.red().to_string(),
        RiskLevel::Critical => text.red().bold().to_string(),
    }
}

pub fn tier_label(tier: EscalationTier, color: bool) -> String {
    let text = tier.to_string();
    if !color {
        return text;
    }
    match tier {
        EscalationTier::Initial => text.green().to_string(),
        EscalationTier::Elevated => text.yellow().to_string(),
        EscalationTier::Moderate => text.magenta().to_string(),
        EscalationTier::Severe => text.red().bold().to_string(),
    }
}

/// Whether stdout is a terminal.
pub fn stdout_color() -> bool {
    io::stdout().is_terminal()
}

/// Writes `value` to stdout as pretty JSON followed by a newline.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
