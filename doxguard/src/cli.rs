// doxguard/src/cli.rs
//! This file defines the command-line interface (CLI) for the doxguard application,
//! including all available commands and their arguments.
//! License: MIT OR APACHE 2.0

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use doxguard_core::{AuxiliaryKind, RiskLevel, RuleKind};

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "doxguard",
    author = "Relay",
    version = env!("CARGO_PKG_VERSION"),
    about = "Detect personal information in chat text and govern exclusion rules",
    long_about = "doxguard scans chat messages for personal information (phone numbers, email addresses, social security numbers, payment cards, street addresses and self-identified names), filters the results through per-community and global exclusion rules, and turns repeated detections into an escalation tier. Platform identifiers and mentions are never treated as personal information.",
    arg_required_else_help = true,
)]
pub struct Cli {
    /// Disable informational messages
    #[arg(long, short = 'q', global = true, help = "Suppress all informational and debug messages.")]
    pub quiet: bool,

    /// Enable debug logging (overrides RUST_LOG for the doxguard crates)
    #[arg(long, short = 'd', global = true, help = "Enable debug logging.")]
    pub debug: bool,

    /// Directory holding the exceptions and detections documents.
    #[arg(long = "data-dir", value_name = "DIR", env = "DOXGUARD_DATA_DIR", global = true, help = "Directory holding the exceptions and detections documents.")]
    pub data_dir: Option<PathBuf>,

    /// Path to a YAML settings file.
    #[arg(long = "config", value_name = "FILE", global = true, help = "Path to a YAML settings file overriding the built-in defaults.")]
    pub config: Option<PathBuf>,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// All available commands for the `doxguard` CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scans text from a file or stdin for personal information.
    #[command(about = "Scans text from a file or stdin for personal information.")]
    Scan(ScanCommand),

    /// Manages exclusion rules.
    #[command(subcommand, about = "Adds, removes and lists exclusion rules.")]
    Rules(RulesCommand),

    /// Validates and repairs the protected global rule.
    #[command(subcommand, about = "Validates, repairs and maintains the protected global rule.")]
    Guardian(GuardianCommand),

    /// Computes the escalation tier for a subject without scanning anything.
    #[command(about = "Computes the escalation tier for a subject from its detection history.")]
    Decide(DecideCommand),
}

/// Arguments for the `scan` command.
#[derive(Args, Debug)]
pub struct ScanCommand {
    /// Path to an input file (reads from stdin if not provided).
    #[arg(long, short = 'i', value_name = "FILE", help = "Read input from a specified file instead of stdin.")]
    pub input_file: Option<PathBuf>,

    /// Community whose exclusion rules apply.
    #[arg(long, short = 's', value_name = "SCOPE", default_value = "default", help = "Community (scope) whose exclusion rules apply.")]
    pub scope: String,

    /// Record the detection for this subject and print an escalation decision.
    #[arg(long, value_name = "SUBJECT", help = "Record the detection for this subject and print the escalation decision.")]
    pub subject: Option<String>,

    /// Prior sanctions of the subject.
    #[arg(long, value_name = "N", default_value_t = 0, requires = "subject", help = "Number of prior sanctions of the subject.")]
    pub sanctions: u32,

    /// Print the input with every match censored.
    #[arg(long, help = "Print the input with every match replaced by its censored form.")]
    pub censor: bool,

    /// Print the result as JSON.
    #[arg(long, help = "Print the result as JSON to stdout.")]
    pub json: bool,

    /// Exit with code 1 when something was detected.
    #[arg(long = "fail-on-detection", help = "Exit with a non-zero code when personal information is detected.")]
    pub fail_on_detection: bool,
}

/// Subcommands of `rules`.
#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// Adds an exclusion rule.
    Add(RuleAddArgs),
    /// Removes an exclusion rule by id.
    Remove(RuleRemoveArgs),
    /// Lists exclusion rules.
    List(RuleListArgs),
}

#[derive(Args, Debug)]
pub struct RuleAddArgs {
    /// Scope id, or `_global` for a rule that applies everywhere.
    #[arg(long, short = 's', value_name = "SCOPE")]
    pub scope: String,

    /// Category key (`phone`, `email`, `ssn`, `creditCard`, `address`, `fullName`) or `any`.
    #[arg(long, short = 'c', value_name = "CATEGORY")]
    pub category: String,

    /// Value to exclude.
    #[arg(value_name = "VALUE")]
    pub value: String,

    /// How the value is compared: exact, substring or regex.
    #[arg(long, short = 'k', value_name = "KIND", default_value = "exact", value_parser = parse_rule_kind)]
    pub kind: RuleKind,

    #[arg(long, short = 'r', value_name = "TEXT", default_value = "")]
    pub reason: String,

    /// Who is making the change.
    #[arg(long, value_name = "NAME", default_value = "cli", env = "DOXGUARD_ACTOR")]
    pub actor: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RuleRemoveArgs {
    #[arg(long, short = 's', value_name = "SCOPE")]
    pub scope: String,

    #[arg(long, short = 'c', value_name = "CATEGORY")]
    pub category: String,

    /// Id of the rule to remove.
    #[arg(value_name = "RULE_ID")]
    pub rule_id: String,

    #[arg(long, value_name = "NAME", default_value = "cli", env = "DOXGUARD_ACTOR")]
    pub actor: String,
}

#[derive(Args, Debug)]
pub struct RuleListArgs {
    /// Only list this scope.
    #[arg(long, short = 's', value_name = "SCOPE")]
    pub scope: Option<String>,

    #[arg(long)]
    pub json: bool,
}

/// Subcommands of `guardian`.
#[derive(Subcommand, Debug)]
pub enum GuardianCommand {
    /// Checks the protected rule and prints the findings.
    Validate {
        #[arg(long)]
        json: bool,
    },
    /// Repairs the protected rule if validation fails.
    Repair {
        #[arg(long, value_name = "NAME", default_value = "cli", env = "DOXGUARD_ACTOR")]
        actor: String,
        #[arg(long)]
        json: bool,
    },
    /// Runs one maintenance cycle.
    Maintain {
        #[arg(long)]
        json: bool,
    },
    /// Runs maintenance periodically until interrupted.
    Watch {
        #[arg(long = "interval-secs", value_name = "SECONDS", default_value_t = 300)]
        interval_secs: u64,
    },
    /// Switches the protected rule, or one of its mention patterns, on or off.
    Toggle {
        /// `on` or `off`.
        #[arg(value_name = "STATE", action = ArgAction::Set, value_parser = parse_switch)]
        enabled: bool,
        /// Mention pattern to toggle instead of the whole rule.
        #[arg(long, value_name = "KIND", value_parser = parse_auxiliary_kind)]
        aux: Option<AuxiliaryKind>,
        #[arg(long, value_name = "NAME", default_value = "cli", env = "DOXGUARD_ACTOR")]
        actor: String,
    },
}

/// Arguments for the `decide` command.
#[derive(Args, Debug)]
pub struct DecideCommand {
    #[arg(long, value_name = "SUBJECT")]
    pub subject: String,

    #[arg(long, short = 's', value_name = "SCOPE", default_value = "default")]
    pub scope: String,

    /// Risk level of the triggering detection.
    #[arg(long, value_name = "LEVEL", default_value = "low", value_parser = parse_risk_level)]
    pub risk: RiskLevel,

    #[arg(long, value_name = "N", default_value_t = 0)]
    pub sanctions: u32,

    #[arg(long)]
    pub json: bool,
}

fn parse_rule_kind(s: &str) -> Result<RuleKind, String> {
    s.parse()
}

fn parse_risk_level(s: &str) -> Result<RiskLevel, String> {
    s.parse()
}

fn parse_auxiliary_kind(s: &str) -> Result<AuxiliaryKind, String> {
    s.parse()
}

fn parse_switch(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" | "enable" | "enabled" => Ok(true),
        "off" | "false" | "disable" | "disabled" => Ok(false),
        other => Err(format!("expected 'on' or 'off', got '{}'", other)),
    }
}
