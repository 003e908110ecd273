//! guardian.rs - Validation and self-repair of the protected global rule.
//!
//! The guardian never edits the document itself. It inspects the store, decides
//! what is wrong, and asks the store to run the protected-rule migration, which is
//! the only code path allowed to rewrite that rule.
//!
//! License: MIT OR APACHE 2.0

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::config::ExceptionConfig;
use crate::engines::fast_path;
use crate::errors::GuardError;
use crate::exceptions::{
    AuxiliaryKind, ChangeReport, ExceptionStore, MaintenanceEntry, RuleKind, CANONICAL_PATTERN,
    PROTECTED_RULE_VERSION, SYSTEM_ACTOR,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    Missing,
    PatternInvalid,
    Disabled,
    Outdated,
    AuxiliaryInvalid,
    Structure,
    PatternDrift,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<String>,
    pub checked_at: DateTime<Utc>,
    /// Outcome of the drift probe as `(store, fast path)`, when the probe ran.
    #[serde(skip)]
    pub probe: Option<(bool, bool)>,
    #[serde(skip)]
    pub probe_value: String,
}

impl ValidationReport {
    /// The drift found by the probe, as a typed error.
    pub fn drift_error(&self) -> Option<GuardError> {
        let drifted = self.issues.iter().any(|i| i.kind == IssueKind::PatternDrift);
        match self.probe {
            Some((store, fast_path)) if drifted => Some(GuardError::PatternDrift {
                probe: self.probe_value.clone(),
                store,
                fast_path,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub repaired: bool,
    pub actor: String,
    pub issues_before: Vec<ValidationIssue>,
    pub issues_after: Vec<ValidationIssue>,
    pub change: Option<ChangeReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub at: DateTime<Utc>,
    pub issues_found: usize,
    pub issues_fixed: usize,
    pub repaired: bool,
    pub persisted: bool,
    pub validation: ValidationReport,
}

/// Keeps the protected rule present, current and in agreement with the fast path.
#[derive(Debug, Clone)]
pub struct ConfigurationGuardian {
    probe: String,
}

impl ConfigurationGuardian {
    pub fn new(settings: &ExceptionConfig) -> Self {
        Self { probe: settings.drift_probe.clone() }
    }

    /// Creates, upgrades or (with `force_update`) rewrites the protected rule.
    pub fn ensure_protected_rule(&self, store: &ExceptionStore, force_update: bool) -> Result<ChangeReport, GuardError> {
        let reason = if force_update { "forced update" } else { "ensure protected rule" };
        let report = store.ensure_protected(force_update, SYSTEM_ACTOR, reason)?;
        if report.changed {
            info!("Protected rule {:?}, now at revision {}.", report.action, report.revision);
        } else {
            debug!("Protected rule already current at revision {}.", report.revision);
        }
        Ok(report)
    }

    pub fn validate(&self, store: &ExceptionStore) -> ValidationReport {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        let mut probe = None;

        match store.protected_rule() {
            None => issues.push(ValidationIssue::new(IssueKind::Missing, "protected rule is absent")),
            Some(rule) => {
                if let Err(e) = Regex::new(&rule.rule.value) {
                    issues.push(ValidationIssue::new(IssueKind::PatternInvalid, format!("pattern does not compile: {}", e)));
                }
                if !rule.rule.enabled {
                    issues.push(ValidationIssue::new(IssueKind::Disabled, "protected rule is disabled"));
                }
                if rule.version != PROTECTED_RULE_VERSION {
                    issues.push(ValidationIssue::new(
                        IssueKind::Outdated,
                        format!("version {} is not the current {}", rule.version, PROTECTED_RULE_VERSION),
                    ));
                } else if rule.rule.value != CANONICAL_PATTERN {
                    issues.push(ValidationIssue::new(IssueKind::Outdated, "pattern differs from the canonical pattern"));
                }
                if !rule.system_protected || rule.rule.kind != RuleKind::Regex {
                    issues.push(ValidationIssue::new(IssueKind::Structure, "rule lost its system-protected regex shape"));
                }

                for kind in AuxiliaryKind::ALL {
                    match rule.auxiliary.iter().find(|a| a.kind == kind) {
                        None => issues.push(ValidationIssue::new(
                            IssueKind::AuxiliaryInvalid,
                            format!("auxiliary pattern '{}' is missing", kind),
                        )),
                        Some(aux) => {
                            match Regex::new(&aux.pattern) {
                                Err(e) => issues.push(ValidationIssue::new(
                                    IssueKind::AuxiliaryInvalid,
                                    format!("auxiliary pattern '{}' does not compile: {}", kind, e),
                                )),
                                // Checked against the stored pattern itself: the main pattern
                                // already covers the bare id inside every mention.
                                Ok(pattern) => {
                                    let sample = kind.sample(&self.probe);
                                    if fast_path::is_platform_identifier(&sample) && !pattern.is_match(&sample) {
                                        issues.push(ValidationIssue::new(
                                            IssueKind::PatternDrift,
                                            format!("auxiliary pattern '{}' does not match {}", kind, sample),
                                        ));
                                    }
                                }
                            }
                            if !aux.enabled {
                                warnings.push(format!("auxiliary pattern '{}' is disabled", kind));
                            }
                        }
                    }
                }

                // A disabled rule is already reported; the probe would only repeat it.
                if rule.rule.enabled {
                    let store_hit = store.is_globally_excluded(&self.probe);
                    let fast_hit = fast_path::contains_platform_identifier(&self.probe);
                    probe = Some((store_hit, fast_hit));
                    if store_hit != fast_hit {
                        warn!("Pattern drift: store={} fast_path={} on the identifier probe.", store_hit, fast_hit);
                        issues.push(ValidationIssue::new(
                            IssueKind::PatternDrift,
                            format!("store and fast path disagree on the probe (store: {}, fast path: {})", store_hit, fast_hit),
                        ));
                    }
                }
            }
        }

        for skipped in store.skipped_rules() {
            warnings.push(format!("rule '{}' is stored but inactive", skipped));
        }

        ValidationReport {
            valid: issues.is_empty(),
            issues,
            warnings,
            checked_at: Utc::now(),
            probe,
            probe_value: self.probe.clone(),
        }
    }

    /// Repairs the protected rule when validation fails. A valid store is left untouched.
    pub fn repair(&self, store: &ExceptionStore, actor: &str) -> Result<RepairReport, GuardError> {
        let before = self.validate(store);
        if before.valid {
            debug!("Repair requested by '{}' but the protected rule is valid.", actor);
            return Ok(RepairReport {
                repaired: false,
                actor: actor.to_string(),
                issues_before: Vec::new(),
                issues_after: Vec::new(),
                change: None,
            });
        }

        let reason = before
            .issues
            .iter()
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let change = store.repair_protected(actor, &reason)?;
        let after = self.validate(store);
        info!(
            "Protected rule repaired by '{}': {} issue(s) before, {} after.",
            actor,
            before.issues.len(),
            after.issues.len()
        );

        Ok(RepairReport {
            repaired: true,
            actor: actor.to_string(),
            issues_before: before.issues,
            issues_after: after.issues,
            change: Some(change),
        })
    }

    /// Validate, repair if needed, and log the run in the maintenance history.
    ///
    /// The history entry is persisted only when a repair happened; otherwise it rides
    /// along with the next durable change.
    pub fn run_maintenance(&self, store: &ExceptionStore) -> Result<MaintenanceReport, GuardError> {
        let validation = self.validate(store);
        let issues_found = validation.issues.len();

        let (repaired, issues_fixed) = if validation.valid {
            (false, 0)
        } else {
            let repair = self.repair(store, SYSTEM_ACTOR)?;
            (repair.repaired, issues_found.saturating_sub(repair.issues_after.len()))
        };

        let at = Utc::now();
        store.record_maintenance(
            MaintenanceEntry {
                at,
                issues_found,
                issues_fixed,
                repaired,
                actor: SYSTEM_ACTOR.to_string(),
            },
            repaired,
        )?;
        if repaired {
            info!("Maintenance fixed {}/{} issue(s).", issues_fixed, issues_found);
        } else {
            debug!("Maintenance found nothing to fix.");
        }

        Ok(MaintenanceReport {
            at,
            issues_found,
            issues_fixed,
            repaired,
            persisted: repaired,
            validation,
        })
    }
}
