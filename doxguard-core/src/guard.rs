//! guard.rs - One-stop facade wiring the engine, store, ledger and policy together.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, info, warn};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::config::GuardConfig;
use crate::detection_match::ScanResult;
use crate::engine::DetectionEngine;
use crate::engines::regex_engine::RegexEngine;
use crate::errors::GuardError;
use crate::escalation::{EscalationDecision, EscalationPolicy, SanctionCountProvider};
use crate::exceptions::ExceptionStore;
use crate::guardian::{ConfigurationGuardian, MaintenanceReport, RepairReport, ValidationReport};
use crate::ledger::{DetectionLedger, DetectionRecord};
use crate::risk::RiskLevel;
use crate::storage::{DocumentBackend, FileBackend};

/// Result of [`Guard::process`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub scan: ScanResult,
    /// Present when something was detected.
    pub decision: Option<EscalationDecision>,
    pub record_id: Option<String>,
    /// Why the detection could not be recorded. The scan and decision still stand.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_error: Option<String>,
}

#[derive(Debug)]
pub struct Guard {
    config: GuardConfig,
    store: Arc<ExceptionStore>,
    engine: RegexEngine,
    ledger: Arc<DetectionLedger>,
    policy: EscalationPolicy,
    guardian: ConfigurationGuardian,
}

impl Guard {
    /// Loads the exceptions and ledger documents from `backend`. Never fails: corrupt
    /// documents are recovered by the store and the ledger.
    pub fn open(backend: Arc<dyn DocumentBackend>, config: GuardConfig) -> Self {
        let store = Arc::new(ExceptionStore::load(Arc::clone(&backend), &config));
        let ledger = Arc::new(DetectionLedger::load(backend, &config));
        let engine = RegexEngine::with_options(Arc::clone(&store), config.detection.clone());
        let policy = EscalationPolicy::new(Arc::clone(&ledger), config.escalation);
        let guardian = ConfigurationGuardian::new(&config.exceptions);
        info!("Guard ready with {} category(ies) enabled.", engine.catalog().categories().len());

        Self { config, store, engine, ledger, policy, guardian }
    }

    /// Opens a guard persisting under `dir` with a [`FileBackend`].
    pub fn open_dir<P: AsRef<Path>>(dir: P, config: GuardConfig) -> Self {
        Self::open(Arc::new(FileBackend::new(dir.as_ref())), config)
    }

    pub fn scan(&self, text: &str, scope: &str) -> ScanResult {
        self.engine.scan(text, scope)
    }

    pub fn decide(&self, subject: &str, scope: &str, risk: RiskLevel, prior_sanctions: u32) -> EscalationDecision {
        self.policy.decide(subject, scope, risk, prior_sanctions)
    }

    /// Scans `text`, decides from the history that precedes it, then records it.
    ///
    /// Nothing is recorded when nothing was detected. A ledger write failure does not
    /// discard the scan: the outcome comes back with `record_error` set instead.
    pub fn process(
        &self,
        subject: &str,
        scope: &str,
        text: &str,
        sanctions: &dyn SanctionCountProvider,
    ) -> Result<ProcessOutcome, GuardError> {
        let scan = self.engine.scan(text, scope);
        if !scan.detected {
            debug!("Nothing detected for subject '{}' in scope '{}'.", subject, scope);
            return Ok(ProcessOutcome { scan, decision: None, record_id: None, record_error: None });
        }

        let decision = self.policy.decide_with(subject, scope, scan.risk_level, sanctions);
        let (record_id, record_error) = match self.ledger.record(DetectionRecord::from_scan(subject, scope, &scan)) {
            Ok(id) => {
                info!(
                    "Detection '{}' for subject '{}' in scope '{}': risk {}, tier {}.",
                    id, subject, scope, scan.risk_level, decision.tier
                );
                (Some(id), None)
            }
            Err(e @ GuardError::MissingField(_)) => return Err(e),
            Err(e) => {
                warn!(
                    "Detection for subject '{}' in scope '{}' (risk {}, tier {}) could not be recorded: {}",
                    subject, scope, scan.risk_level, decision.tier, e
                );
                (None, Some(e.to_string()))
            }
        };

        Ok(ProcessOutcome {
            scan,
            decision: Some(decision),
            record_id,
            record_error,
        })
    }

    pub fn validate(&self) -> ValidationReport {
        self.guardian.validate(&self.store)
    }

    pub fn repair(&self, actor: &str) -> Result<RepairReport, GuardError> {
        self.guardian.repair(&self.store, actor)
    }

    pub fn run_maintenance(&self) -> Result<MaintenanceReport, GuardError> {
        self.guardian.run_maintenance(&self.store)
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ExceptionStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<DetectionLedger> {
        &self.ledger
    }

    pub fn engine(&self) -> &RegexEngine {
        &self.engine
    }

    pub fn guardian(&self) -> &ConfigurationGuardian {
        &self.guardian
    }
}
