//! Configuration management for `doxguard-core`.
//!
//! This module defines the tunable settings of the detection engine, the escalation
//! policy, the exception store and the persistence layer. Settings are read from YAML,
//! with every field falling back to the built-in defaults embedded from
//! `config/default_config.yaml`.
//!
//! License: MIT OR Apache-2.0

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Score cut-offs for mapping a weighted match sum to a risk level.
/// Evaluated highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            critical: 8,
            high: 5,
            medium: 3,
            low: 1,
        }
    }
}

/// Settings for the detection engine.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// The advisory address category produces many false positives and is off by default.
    pub address_enabled: bool,
    /// Character used when censoring matched text.
    pub mask_char: char,
    pub risk_thresholds: RiskThresholds,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            address_enabled: false,
            mask_char: '*',
            risk_thresholds: RiskThresholds::default(),
        }
    }
}

/// Upper bound for `escalation.window_hours`: ten years.
pub const MAX_WINDOW_HOURS: i64 = 24 * 366 * 10;

/// Cut-offs for the escalation table. `*_recent` values count detections for the
/// same subject and scope inside `window_hours`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub window_hours: i64,
    pub severe_recent: usize,
    pub moderate_recent: usize,
    pub moderate_sanctions: u32,
    pub elevated_recent: usize,
    pub elevated_sanctions: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            severe_recent: 3,
            moderate_recent: 2,
            moderate_sanctions: 2,
            elevated_recent: 1,
            elevated_sanctions: 1,
        }
    }
}

/// Settings for the exception store and its guardian.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExceptionConfig {
    /// Maximum entries kept in the protected rule's configuration history.
    pub history_limit: usize,
    /// Maximum entries kept in the guardian's maintenance history.
    pub maintenance_history_limit: usize,
    /// Identifier-shaped value used to cross-check the store against the engine fast path.
    pub drift_probe: String,
}

impl Default for ExceptionConfig {
    fn default() -> Self {
        Self {
            history_limit: 25,
            maintenance_history_limit: 50,
            drift_probe: "112233445566778899".to_string(),
        }
    }
}

/// Retry policy for durable writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_ms: 50,
        }
    }
}

/// Represents the top-level configuration structure for doxguard.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardConfig {
    pub detection: DetectionConfig,
    pub escalation: EscalationConfig,
    pub exceptions: ExceptionConfig,
    pub persistence: PersistenceConfig,
}

impl GuardConfig {
    /// Loads settings from a YAML file. Missing keys keep their default values.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading settings from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: GuardConfig = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(config)
    }

    /// Loads the built-in settings embedded in the library.
    pub fn load_default() -> Result<Self> {
        debug!("Loading default settings from embedded string...");
        let default_yaml = include_str!("../config/default_config.yaml");
        let config: GuardConfig = serde_yml::from_str(default_yaml)
            .context("Failed to parse default settings")?;
        Ok(config)
    }

    /// Checks that cut-offs are ordered and that limits are usable.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        let t = &self.detection.risk_thresholds;
        if !(t.critical > t.high && t.high > t.medium && t.medium > t.low && t.low >= 1) {
            errors.push(format!(
                "risk thresholds must be strictly descending and positive (critical {}, high {}, medium {}, low {})",
                t.critical, t.high, t.medium, t.low
            ));
        }

        let e = &self.escalation;
        if e.window_hours <= 0 || e.window_hours > MAX_WINDOW_HOURS {
            errors.push(format!(
                "escalation.window_hours must be between 1 and {} (got {})",
                MAX_WINDOW_HOURS, e.window_hours
            ));
        }
        if !(e.severe_recent > e.moderate_recent && e.moderate_recent > e.elevated_recent && e.elevated_recent >= 1) {
            errors.push("escalation recent-detection cut-offs must be strictly descending and positive".to_string());
        }
        if e.moderate_sanctions < e.elevated_sanctions {
            errors.push("escalation.moderate_sanctions cannot be lower than escalation.elevated_sanctions".to_string());
        }

        if self.exceptions.history_limit == 0 || self.exceptions.maintenance_history_limit == 0 {
            errors.push("history limits must be greater than 0".to_string());
        }
        let probe = &self.exceptions.drift_probe;
        if !(17..=19).contains(&probe.len()) || !probe.chars().all(|c| c.is_ascii_digit()) {
            errors.push(format!("exceptions.drift_probe '{}' must be a 17-19 digit identifier", probe));
        }

        if self.persistence.retry_attempts == 0 {
            errors.push("persistence.retry_attempts must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("Settings validation failed:\n{}", errors.join("\n")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_match_code_defaults() {
        let embedded = GuardConfig::load_default().unwrap();
        assert_eq!(embedded, GuardConfig::default());
        assert!(embedded.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: GuardConfig = serde_yml::from_str("detection:\n  address_enabled: true\n").unwrap();
        assert!(config.detection.address_enabled);
        assert_eq!(config.detection.mask_char, '*');
        assert_eq!(config.escalation.window_hours, 24);
    }

    #[test]
    fn test_validate_rejects_unordered_thresholds() {
        let mut config = GuardConfig::default();
        config.detection.risk_thresholds.high = 9;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("risk thresholds"));
    }

    #[test]
    fn test_validate_rejects_bad_probe() {
        let mut config = GuardConfig::default();
        config.exceptions.drift_probe = "12345".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_window() {
        let mut config = GuardConfig::default();
        config.escalation.window_hours = i64::MAX / 1000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("escalation.window_hours"));

        config.escalation.window_hours = MAX_WINDOW_HOURS;
        assert!(config.validate().is_ok());
    }
}
