// doxguard-core/tests/persistence_tests.rs
use anyhow::Result;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

use doxguard_core::exceptions::{CORRUPT_DOCUMENT_KEY, EXCEPTIONS_DOCUMENT_KEY};
use doxguard_core::ledger::LEDGER_DOCUMENT_KEY;
use doxguard_core::{
    DetectionCategory, EscalationTier, FileBackend, Guard, GuardConfig, NoSanctions, RiskLevel, RuleKind,
    PROTECTED_RULE_VERSION,
};

fn document_path(dir: &std::path::Path, key: &str) -> std::path::PathBuf {
    dir.join(format!("{}.json", key))
}

#[test]
fn test_rules_and_history_survive_a_restart() -> Result<()> {
    let dir = tempdir()?;
    let config = GuardConfig::load_default()?;

    let rule_id = {
        let guard = Guard::open_dir(dir.path(), config.clone());
        let rule = guard
            .store()
            .add_rule("guild-1", "email", "support@example.com", RuleKind::Exact, "staff", "mod")?;
        guard.process("alice", "guild-1", "reach me at alice@example.com", &NoSanctions)?;
        rule.id
    };

    let guard = Guard::open_dir(dir.path(), config);
    let rules = guard.store().list_rules("guild-1");
    assert_eq!(rules["email"][0].id, rule_id);
    assert_eq!(guard.ledger().len(), 1);
    assert!(!guard.scan("support@example.com", "guild-1").detected);

    // The second detection sees the first one from the reloaded ledger.
    let outcome = guard.process("alice", "guild-1", "alice@example.com", &NoSanctions)?;
    assert_eq!(outcome.decision.map(|d| d.tier), Some(EscalationTier::Elevated));
    Ok(())
}

#[test]
fn test_corrupt_exceptions_file_still_excludes_identifiers() -> Result<()> {
    let dir = tempdir()?;
    fs::write(document_path(dir.path(), EXCEPTIONS_DOCUMENT_KEY), "{\"_global\": [")?;

    let guard = Guard::open(Arc::new(FileBackend::new(dir.path())), GuardConfig::default());
    assert!(!guard.scan("hey <@123456789012345678>", "guild-1").detected);
    assert!(guard.validate().valid);

    let saved = fs::read_to_string(document_path(dir.path(), CORRUPT_DOCUMENT_KEY))?;
    assert_eq!(saved, "{\"_global\": [");
    let repaired = fs::read_to_string(document_path(dir.path(), EXCEPTIONS_DOCUMENT_KEY))?;
    assert!(repaired.contains(PROTECTED_RULE_VERSION));
    Ok(())
}

#[test]
fn test_outdated_protected_rule_is_migrated_on_load() -> Result<()> {
    let dir = tempdir()?;
    let legacy = r#"{
  "_global": {
    "discordIds": {
      "id": "global-discord-ids",
      "scope": "_global",
      "category": "discordIds",
      "kind": "regex",
      "value": "\\b\\d{17,18}\\b",
      "addedBy": "system",
      "addedAt": "2023-01-01T00:00:00Z",
      "enabled": false,
      "version": "1.0.0",
      "revision": 4,
      "systemProtected": true,
      "auxiliary": [],
      "history": []
    }
  }
}"#;
    fs::write(document_path(dir.path(), EXCEPTIONS_DOCUMENT_KEY), legacy)?;

    let guard = Guard::open_dir(dir.path(), GuardConfig::default());
    let protected = guard.store().protected_rule().expect("protected rule present");
    assert_eq!(protected.version, PROTECTED_RULE_VERSION);
    assert!(protected.revision > 4);
    // A moderator's decision to disable the rule survives the migration.
    assert!(!protected.rule.enabled);
    assert!(!protected.history.is_empty());
    Ok(())
}

#[test]
fn test_corrupt_ledger_starts_empty() -> Result<()> {
    let dir = tempdir()?;
    fs::write(document_path(dir.path(), LEDGER_DOCUMENT_KEY), "not json at all")?;

    let guard = Guard::open_dir(dir.path(), GuardConfig::default());
    assert!(guard.ledger().is_empty());

    let outcome = guard.process("bob", "guild-2", "ssn 123-45-6789", &NoSanctions)?;
    assert_eq!(outcome.scan.count_for(DetectionCategory::SocialSecurityNumber), 1);
    assert_eq!(outcome.scan.risk_level, RiskLevel::High);
    assert_eq!(guard.ledger().len(), 1);
    Ok(())
}
