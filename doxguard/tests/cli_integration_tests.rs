// doxguard/tests/cli_integration_tests.rs
//! Command-line integration tests for the `doxguard` binary.
//!
//! Every test points `--data-dir` at its own temporary directory so runs are isolated
//! and leave no artifacts. Output is not a terminal under `assert_cmd`, so no color
//! codes appear in the captured streams.

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile, TempDir};

fn doxguard(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("doxguard").expect("binary is built");
    cmd.arg("--data-dir").arg(data_dir.path());
    cmd.env_remove("RUST_LOG").env_remove("DOXGUARD_ACTOR");
    cmd
}

#[test]
fn test_scan_clean_text() -> Result<()> {
    let dir = tempdir()?;
    doxguard(&dir)
        .args(["scan", "--scope", "guild-1"])
        .write_stdin("hello <@123456789012345678>, see <#12345678901234567>")
        .assert()
        .success()
        .stdout(predicate::str::contains("No personal information detected."));
    Ok(())
}

#[test]
fn test_scan_reports_censored_matches() -> Result<()> {
    let dir = tempdir()?;
    doxguard(&dir)
        .args(["scan"])
        .write_stdin("card 4111 1111 1111 1111")
        .assert()
        .success()
        .stdout(predicate::str::contains("**** **** **** 1111"))
        .stdout(predicate::str::contains("4111 1111 1111 1111").not());
    Ok(())
}

#[test]
fn test_scan_censor_mode_rewrites_input() -> Result<()> {
    let dir = tempdir()?;
    doxguard(&dir)
        .args(["--quiet", "scan", "--censor"])
        .write_stdin("mail alice@example.com now\n")
        .assert()
        .success()
        .stdout("mail a****@example.com now\n");
    Ok(())
}

#[test]
fn test_scan_fail_on_detection_sets_exit_code() -> Result<()> {
    let dir = tempdir()?;
    doxguard(&dir)
        .args(["scan", "--fail-on-detection"])
        .write_stdin("ssn 123-45-6789")
        .assert()
        .code(1);
    doxguard(&dir)
        .args(["scan", "--fail-on-detection"])
        .write_stdin("nothing here")
        .assert()
        .success();
    Ok(())
}

#[test]
fn test_scan_reads_input_file() -> Result<()> {
    let dir = tempdir()?;
    let mut input = NamedTempFile::new()?;
    writeln!(input, "call me at (555) 123-4567")?;
    doxguard(&dir)
        .args(["scan", "--json", "--input-file"])
        .arg(input.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"category\": \"phone\""))
        .stdout(predicate::str::contains("\"detected\": true"));
    Ok(())
}

#[test]
fn test_scan_with_subject_records_and_escalates() -> Result<()> {
    let dir = tempdir()?;
    for expected in ["initial", "elevated", "moderate", "severe"] {
        doxguard(&dir)
            .args(["scan", "--scope", "guild-1", "--subject", "user-7"])
            .write_stdin("mail alice@example.com")
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("Escalation: {}", expected)))
            .stdout(predicate::str::contains("Recorded as"));
    }

    doxguard(&dir)
        .args(["decide", "--subject", "user-7", "--scope", "guild-1", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tier\": \"severe\""))
        .stdout(predicate::str::contains("\"subjectRecentDetectionCount\": 4"));
    Ok(())
}

#[test]
fn test_decide_uses_sanctions() -> Result<()> {
    let dir = tempdir()?;
    doxguard(&dir)
        .args(["decide", "--subject", "newcomer", "--risk", "low", "--sanctions", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tier: moderate"));
    Ok(())
}

#[test]
fn test_rule_lifecycle() -> Result<()> {
    let dir = tempdir()?;
    let output = doxguard(&dir)
        .args(["rules", "add", "--scope", "guild-1", "--category", "email", "support@example.com"])
        .output()?;
    assert!(output.status.success());
    let rule_id = String::from_utf8(output.stdout)?.trim().to_string();
    assert!(!rule_id.is_empty());

    doxguard(&dir)
        .args(["scan", "--scope", "guild-1"])
        .write_stdin("write to support@example.com")
        .assert()
        .success()
        .stdout(predicate::str::contains("No personal information detected."));

    doxguard(&dir)
        .args(["rules", "list", "--scope", "guild-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(rule_id.as_str()))
        .stdout(predicate::str::contains("support@example.com"));

    doxguard(&dir)
        .args(["rules", "remove", "--scope", "guild-1", "--category", "email", &rule_id])
        .assert()
        .success();

    doxguard(&dir)
        .args(["scan", "--scope", "guild-1"])
        .write_stdin("write to support@example.com")
        .assert()
        .success()
        .stdout(predicate::str::contains("s******@example.com"));
    Ok(())
}

#[test]
fn test_invalid_regex_rule_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    doxguard(&dir)
        .args(["rules", "add", "-s", "guild-1", "-c", "phone", "--kind", "regex", "(["])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid regular expression"));
    Ok(())
}

#[test]
fn test_protected_rule_cannot_be_removed() -> Result<()> {
    let dir = tempdir()?;
    doxguard(&dir)
        .args(["rules", "remove", "--scope", "_global", "--category", "discordIds", "global-discord-ids"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("system protected"));

    doxguard(&dir)
        .args(["rules", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": \"global-discord-ids\""));
    Ok(())
}

#[test]
fn test_guardian_validate_repair_cycle() -> Result<()> {
    let dir = tempdir()?;
    doxguard(&dir)
        .args(["guardian", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Protected rule is valid."));

    doxguard(&dir)
        .args(["guardian", "toggle", "off"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Protected rule disabled"));

    doxguard(&dir)
        .args(["guardian", "validate"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Disabled"));

    doxguard(&dir)
        .args(["guardian", "repair", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"repaired\": true"));

    doxguard(&dir)
        .args(["guardian", "maintain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 0 issue(s), fixed 0."));
    Ok(())
}

#[test]
fn test_guardian_toggles_a_mention_pattern() -> Result<()> {
    let dir = tempdir()?;
    doxguard(&dir)
        .args(["guardian", "toggle", "off", "--aux", "userMention"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Mention pattern 'userMention' disabled"));
    Ok(())
}

#[test]
fn test_custom_config_file() -> Result<()> {
    let dir = tempdir()?;
    let mut config = NamedTempFile::new()?;
    writeln!(config, "detection:\n  mask_char: \"#\"")?;
    doxguard(&dir)
        .arg("--config")
        .arg(config.path())
        .args(["scan", "--censor", "--quiet"])
        .write_stdin("ssn 123-45-6789\n")
        .assert()
        .success()
        .stdout("ssn ###-##-####\n");

    let mut broken = NamedTempFile::new()?;
    writeln!(broken, "escalation:\n  window_hours: 0")?;
    doxguard(&dir)
        .arg("--config")
        .arg(broken.path())
        .args(["guardian", "validate"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("window_hours"));
    Ok(())
}

#[test]
fn test_documents_are_written_to_data_dir() -> Result<()> {
    let dir = tempdir()?;
    doxguard(&dir)
        .args(["scan", "--subject", "u1"])
        .write_stdin("alice@example.com")
        .assert()
        .success();
    let exceptions = fs::read_to_string(dir.path().join("exceptions.json"))?;
    assert!(exceptions.contains("global-discord-ids"));
    let detections = fs::read_to_string(dir.path().join("detections.json"))?;
    assert!(detections.contains("\"subjectId\": \"u1\"") || detections.contains("\"subjectId\":\"u1\""));
    assert!(!detections.contains("alice@example.com"));
    Ok(())
}
