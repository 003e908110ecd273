//! Turns a detection's risk and the subject's history into a response tier.
//!
//! The policy only decides. Acting on the tier (warnings, timeouts, notifying
//! moderators) belongs to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::EscalationConfig;
use crate::ledger::DetectionLedger;
use crate::risk::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationTier {
    Initial,
    Elevated,
    Moderate,
    Severe,
}

impl fmt::Display for EscalationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EscalationTier::Initial => "initial",
            EscalationTier::Elevated => "elevated",
            EscalationTier::Moderate => "moderate",
            EscalationTier::Severe => "severe",
        };
        f.write_str(s)
    }
}

/// Derived on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationDecision {
    pub tier: EscalationTier,
    pub triggering_risk_level: RiskLevel,
    pub subject_prior_sanction_count: u32,
    pub subject_recent_detection_count: usize,
}

/// Source of how often a subject has already been sanctioned.
pub trait SanctionCountProvider: Send + Sync {
    fn prior_sanction_count(&self, subject: &str) -> u32;
}

/// For callers that keep no sanction history.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSanctions;

impl SanctionCountProvider for NoSanctions {
    fn prior_sanction_count(&self, _subject: &str) -> u32 {
        0
    }
}

/// The same count for every subject.
#[derive(Debug, Clone, Copy)]
pub struct FixedSanctions(pub u32);

impl SanctionCountProvider for FixedSanctions {
    fn prior_sanction_count(&self, _subject: &str) -> u32 {
        self.0
    }
}

impl SanctionCountProvider for HashMap<String, u32> {
    fn prior_sanction_count(&self, subject: &str) -> u32 {
        self.get(subject).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    ledger: Arc<DetectionLedger>,
    config: EscalationConfig,
}

impl EscalationPolicy {
    pub fn new(ledger: Arc<DetectionLedger>, config: EscalationConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// The escalation table. First matching row wins.
    pub fn tier_for(&self, risk: RiskLevel, recent: usize, prior_sanctions: u32) -> EscalationTier {
        let c = &self.config;
        if risk == RiskLevel::Critical || recent >= c.severe_recent {
            EscalationTier::Severe
        } else if risk == RiskLevel::High || recent >= c.moderate_recent || prior_sanctions >= c.moderate_sanctions {
            EscalationTier::Moderate
        } else if risk == RiskLevel::Medium || recent >= c.elevated_recent || prior_sanctions >= c.elevated_sanctions {
            EscalationTier::Elevated
        } else {
            EscalationTier::Initial
        }
    }

    pub fn decide(&self, subject: &str, scope: &str, risk: RiskLevel, prior_sanctions: u32) -> EscalationDecision {
        self.decide_at(Utc::now(), subject, scope, risk, prior_sanctions)
    }

    pub fn decide_at(
        &self,
        now: DateTime<Utc>,
        subject: &str,
        scope: &str,
        risk: RiskLevel,
        prior_sanctions: u32,
    ) -> EscalationDecision {
        let recent = self
            .ledger
            .count_recent_for_subject_at(now, subject, scope, self.config.window_hours);
        EscalationDecision {
            tier: self.tier_for(risk, recent, prior_sanctions),
            triggering_risk_level: risk,
            subject_prior_sanction_count: prior_sanctions,
            subject_recent_detection_count: recent,
        }
    }

    /// Like [`decide`](Self::decide), asking `provider` for the sanction count.
    pub fn decide_with(
        &self,
        subject: &str,
        scope: &str,
        risk: RiskLevel,
        provider: &dyn SanctionCountProvider,
    ) -> EscalationDecision {
        self.decide(subject, scope, risk, provider.prior_sanction_count(subject))
    }
}
