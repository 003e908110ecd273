// doxguard/src/commands/rules.rs
//! The `rules` command: add, remove and list exclusion rules.
//!
//! License: MIT OR APACHE 2.0

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

use doxguard_core::exceptions::{rules_by_scope, CategoryRules};
use doxguard_core::{Guard, ProtectedRule, GLOBAL_SCOPE};

use crate::cli::{RuleAddArgs, RuleListArgs, RuleRemoveArgs, RulesCommand};
use crate::output::{self, info_msg, warn_msg};

pub fn run_rules(guard: &Guard, command: &RulesCommand, quiet: bool) -> Result<bool> {
    match command {
        RulesCommand::Add(args) => add(guard, args, quiet),
        RulesCommand::Remove(args) => remove(guard, args, quiet),
        RulesCommand::List(args) => list(guard, args),
    }?;
    Ok(false)
}

fn add(guard: &Guard, args: &RuleAddArgs, quiet: bool) -> Result<()> {
    let rule = guard
        .store()
        .add_rule(&args.scope, &args.category, &args.value, args.kind, &args.reason, &args.actor)
        .with_context(|| format!("Failed to add rule to '{}/{}'", args.scope, args.category))?;

    if args.json {
        return output::print_json(&rule);
    }
    writeln!(io::stdout(), "{}", rule.id)?;
    if !quiet {
        info_msg(format!("Rule '{}' active for {}/{}.", rule.id, rule.scope, rule.category));
    }
    Ok(())
}

fn remove(guard: &Guard, args: &RuleRemoveArgs, quiet: bool) -> Result<()> {
    guard
        .store()
        .remove_rule(&args.scope, &args.category, &args.rule_id, &args.actor)
        .with_context(|| format!("Failed to remove rule '{}'", args.rule_id))?;
    if !quiet {
        info_msg(format!("Removed rule '{}' from {}/{}.", args.rule_id, args.scope, args.category));
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuleListing {
    #[serde(skip_serializing_if = "Option::is_none")]
    protected: Option<ProtectedRule>,
    scopes: BTreeMap<String, CategoryRules>,
    skipped: Vec<String>,
}

fn list(guard: &Guard, args: &RuleListArgs) -> Result<()> {
    let store = guard.store();
    let scopes = match &args.scope {
        Some(scope) => {
            let rules = store.list_rules(scope);
            let mut map = BTreeMap::new();
            if !rules.is_empty() {
                map.insert(scope.clone(), rules);
            }
            map
        }
        None => rules_by_scope(store),
    };
    let show_protected = args.scope.as_deref().map_or(true, |s| s == GLOBAL_SCOPE);
    let listing = RuleListing {
        protected: if show_protected { store.protected_rule() } else { None },
        scopes,
        skipped: store.skipped_rules(),
    };

    if args.json {
        return output::print_json(&listing);
    }

    let mut stdout = io::stdout().lock();
    if let Some(protected) = &listing.protected {
        writeln!(
            stdout,
            "Protected rule '{}' v{} (revision {}): {}",
            protected.rule.id,
            protected.version,
            protected.revision,
            if protected.rule.enabled { "enabled" } else { "DISABLED" }
        )?;
    }

    if listing.scopes.is_empty() {
        writeln!(stdout, "No exclusion rules defined.")?;
    } else {
        writeln!(stdout, "{}", rules_table(&listing.scopes))?;
    }
    drop(stdout);

    for id in &listing.skipped {
        warn_msg(format!("Rule '{}' is stored but inactive: its pattern does not compile.", id));
    }
    Ok(())
}

fn rules_table(scopes: &BTreeMap<String, CategoryRules>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Scope", "Category", "Id", "Kind", "Value", "Added by", "Reason"]);

    for (scope, categories) in scopes {
        for (category, rules) in categories {
            for rule in rules {
                table.add_row(vec![
                    scope.clone(),
                    category.clone(),
                    rule.id.clone(),
                    rule.kind.to_string(),
                    rule.value.clone(),
                    rule.added_by.clone(),
                    rule.reason.clone(),
                ]);
            }
        }
    }
    table
}
