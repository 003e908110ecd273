//! ledger.rs - The append-only record of qualifying detections.
//!
//! Records are kept oldest first in a `Vec`, with an index from `(subject, scope)`
//! to positions so per-subject history is served without a full scan. The whole list
//! is persisted as one document under [`LEDGER_DOCUMENT_KEY`].
//!
//! License: MIT OR APACHE 2.0

use chrono::{DateTime, Duration, TimeDelta, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use uuid::Uuid;

use crate::catalog::DetectionCategory;
use crate::config::{GuardConfig, PersistenceConfig};
use crate::detection_match::ScanResult;
use crate::errors::GuardError;
use crate::risk::RiskLevel;
use crate::storage::{write_with_retry, DocumentBackend};

/// Storage key of the ledger document.
pub const LEDGER_DOCUMENT_KEY: &str = "detections";

/// One qualifying detection. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    pub id: String,
    pub subject_id: String,
    pub scope_id: String,
    pub timestamp: DateTime<Utc>,
    pub categories: Vec<DetectionCategory>,
    pub risk_level: RiskLevel,
}

impl DetectionRecord {
    /// A record stamped now; the id is assigned when it is recorded.
    pub fn new(
        subject_id: &str,
        scope_id: &str,
        categories: impl IntoIterator<Item = DetectionCategory>,
        risk_level: RiskLevel,
    ) -> Self {
        let categories: BTreeSet<DetectionCategory> = categories.into_iter().collect();
        Self {
            id: String::new(),
            subject_id: subject_id.to_string(),
            scope_id: scope_id.to_string(),
            timestamp: Utc::now(),
            categories: categories.into_iter().collect(),
            risk_level,
        }
    }

    pub fn from_scan(subject_id: &str, scope_id: &str, scan: &ScanResult) -> Self {
        Self::new(subject_id, scope_id, scan.categories(), scan.risk_level)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// `now - timestamp <= window`. Records stamped in the future count as recent.
    fn is_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.timestamp) <= window
    }
}

/// The look-back window for `hours`, saturating instead of overflowing.
fn window_of(hours: i64) -> Duration {
    TimeDelta::try_hours(hours).unwrap_or(if hours < 0 { TimeDelta::MIN } else { TimeDelta::MAX })
}

type SubjectKey = (String, String);

#[derive(Debug, Default)]
struct LedgerState {
    records: Vec<DetectionRecord>,
    by_subject: HashMap<SubjectKey, Vec<usize>>,
}

impl LedgerState {
    fn from_records(mut records: Vec<DetectionRecord>) -> Self {
        records.sort_by_key(|r| r.timestamp);
        let mut state = LedgerState { records, by_subject: HashMap::new() };
        state.reindex();
        state
    }

    fn reindex(&mut self) {
        self.by_subject.clear();
        for (i, record) in self.records.iter().enumerate() {
            self.by_subject
                .entry((record.subject_id.clone(), record.scope_id.clone()))
                .or_default()
                .push(i);
        }
    }

    /// Position that keeps the list time ordered; equal timestamps keep arrival order.
    fn insertion_point(&self, record: &DetectionRecord) -> usize {
        self.records.partition_point(|r| r.timestamp <= record.timestamp)
    }

    fn subject_records(&self, subject: &str, scope: &str) -> impl DoubleEndedIterator<Item = &DetectionRecord> {
        self.by_subject
            .get(&(subject.to_string(), scope.to_string()))
            .map(|positions| positions.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|&i| &self.records[i])
    }
}

/// Thread-safe, persisted detection history.
pub struct DetectionLedger {
    backend: Arc<dyn DocumentBackend>,
    persistence: PersistenceConfig,
    state: RwLock<LedgerState>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for DetectionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionLedger")
            .field("records", &self.len())
            .finish_non_exhaustive()
    }
}

impl DetectionLedger {
    /// Loads the ledger. A missing, unreadable or corrupt document yields an empty ledger.
    pub fn load(backend: Arc<dyn DocumentBackend>, config: &GuardConfig) -> Self {
        let records = match backend.read_document(LEDGER_DOCUMENT_KEY) {
            Ok(Some(bytes)) => serde_json::from_slice::<Vec<DetectionRecord>>(&bytes).unwrap_or_else(|e| {
                warn!("Detection ledger is corrupt, starting with an empty ledger: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Detection ledger could not be read, starting with an empty ledger: {}", e);
                Vec::new()
            }
        };
        info!("Detection ledger loaded with {} record(s).", records.len());

        Self {
            backend,
            persistence: config.persistence,
            state: RwLock::new(LedgerState::from_records(records)),
            writer: Mutex::new(()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a record and returns its id. Nothing is kept in memory if persisting fails.
    pub fn record(&self, mut record: DetectionRecord) -> Result<String, GuardError> {
        if record.subject_id.trim().is_empty() {
            return Err(GuardError::MissingField("subjectId"));
        }
        if record.scope_id.trim().is_empty() {
            return Err(GuardError::MissingField("scopeId"));
        }
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }

        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let position = {
            let state = self.read_state();
            let position = state.insertion_point(&record);
            let mut ordered: Vec<&DetectionRecord> = state.records.iter().collect();
            ordered.insert(position, &record);
            let bytes = serde_json::to_vec(&ordered)?;
            write_with_retry(self.backend.as_ref(), LEDGER_DOCUMENT_KEY, &bytes, &self.persistence)?;
            position
        };

        let id = record.id.clone();
        debug!(
            "Recorded detection '{}' for subject '{}' in scope '{}' ({}).",
            id, record.subject_id, record.scope_id, record.risk_level
        );
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if position == state.records.len() {
            let key = (record.subject_id.clone(), record.scope_id.clone());
            state.records.push(record);
            state.by_subject.entry(key).or_default().push(position);
        } else {
            state.records.insert(position, record);
            state.reindex();
        }
        Ok(id)
    }

    /// All records of a subject, oldest first, optionally limited to one scope.
    pub fn for_subject(&self, subject: &str, scope: Option<&str>) -> Vec<DetectionRecord> {
        let state = self.read_state();
        match scope {
            Some(scope) => state.subject_records(subject, scope).cloned().collect(),
            None => state
                .records
                .iter()
                .filter(|r| r.subject_id == subject)
                .cloned()
                .collect(),
        }
    }

    /// Records from the last `within_hours`, optionally limited to one scope.
    pub fn recent(&self, within_hours: i64, scope: Option<&str>) -> Vec<DetectionRecord> {
        self.recent_at(Utc::now(), within_hours, scope)
    }

    pub fn recent_at(&self, now: DateTime<Utc>, within_hours: i64, scope: Option<&str>) -> Vec<DetectionRecord> {
        let window = window_of(within_hours);
        let state = self.read_state();
        let mut recent: Vec<DetectionRecord> = state
            .records
            .iter()
            .rev()
            .take_while(|r| r.is_within(now, window))
            .filter(|r| scope.map_or(true, |s| r.scope_id == s))
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    pub fn recent_for_subject(&self, subject: &str, scope: &str, within_hours: i64) -> Vec<DetectionRecord> {
        self.recent_for_subject_at(Utc::now(), subject, scope, within_hours)
    }

    pub fn recent_for_subject_at(
        &self,
        now: DateTime<Utc>,
        subject: &str,
        scope: &str,
        within_hours: i64,
    ) -> Vec<DetectionRecord> {
        let window = window_of(within_hours);
        let state = self.read_state();
        let mut recent: Vec<DetectionRecord> = state
            .subject_records(subject, scope)
            .rev()
            .take_while(|r| r.is_within(now, window))
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    /// Number of records of a subject in a scope inside the window.
    pub fn count_recent_for_subject_at(&self, now: DateTime<Utc>, subject: &str, scope: &str, within_hours: i64) -> usize {
        let window = window_of(within_hours);
        self.read_state()
            .subject_records(subject, scope)
            .rev()
            .take_while(|r| r.is_within(now, window))
            .count()
    }

    pub fn len(&self) -> usize {
        self.read_state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
