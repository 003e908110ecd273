// doxguard-core/tests/config_tests.rs
use anyhow::Result;
use std::io::Write;
use tempfile::NamedTempFile;

use doxguard_core::GuardConfig;

#[test]
fn test_embedded_defaults_match_type_defaults() -> Result<()> {
    let config = GuardConfig::load_default()?;
    assert_eq!(config, GuardConfig::default());
    config.validate()?;
    Ok(())
}

#[test]
fn test_partial_file_keeps_other_defaults() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "detection:\n  address_enabled: true\nescalation:\n  window_hours: 12")?;

    let config = GuardConfig::load_from_file(file.path())?;
    assert!(config.detection.address_enabled);
    assert_eq!(config.escalation.window_hours, 12);
    assert_eq!(config.escalation.severe_recent, GuardConfig::default().escalation.severe_recent);
    assert_eq!(config.persistence, GuardConfig::default().persistence);
    Ok(())
}

#[test]
fn test_invalid_thresholds_are_rejected() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        "detection:\n  risk_thresholds:\n    critical: 2\n    high: 5\n    medium: 3\n    low: 1"
    )?;
    let err = GuardConfig::load_from_file(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("risk thresholds"));
    Ok(())
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(GuardConfig::load_from_file("/definitely/not/here.yaml").is_err());
}
