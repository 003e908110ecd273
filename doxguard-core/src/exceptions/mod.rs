//! exceptions - The layered exclusion configuration.
//!
//! The store owns one document: the protected global rule, global user rules and
//! per-scope user rules. Reads go through a compiled snapshot behind an `RwLock`.
//! Mutations are serialised by a writer mutex, applied to a draft copy, persisted,
//! and only then published, so the published document never runs ahead of the last
//! durable write. Maintenance entries that were not written yet are held apart and
//! folded into the next durable change.
//!
//! License: MIT OR APACHE 2.0

pub mod chain;
pub mod document;
pub mod protected;
pub mod rule;

use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use uuid::Uuid;

use crate::catalog::DetectionCategory;
use crate::config::{ExceptionConfig, GuardConfig, PersistenceConfig};
use crate::errors::GuardError;
use crate::storage::{write_with_retry, DocumentBackend};

use chain::{ExclusionChain, RuleIndex};
pub use document::{CategoryRules, ExceptionDocument, GlobalSection, MaintenanceEntry};
use document::push_bounded;
pub use protected::{
    AuxiliaryKind, AuxiliaryPattern, ChangeReport, HistoryAction, HistoryEntry, ProtectedRule,
    CANONICAL_PATTERN, PROTECTED_RULE_VERSION, SYSTEM_ACTOR,
};
use protected::CompiledProtected;
pub use rule::{
    compile_user_pattern, CategoryKey, ExclusionRule, RuleKind, ANY_CATEGORY, GLOBAL_SCOPE,
    MAX_PATTERN_LENGTH, PROTECTED_CATEGORY,
};

/// Storage key of the exceptions document.
pub const EXCEPTIONS_DOCUMENT_KEY: &str = "exceptions";
/// Key the unreadable bytes are copied to before a corrupt document is reset.
pub const CORRUPT_DOCUMENT_KEY: &str = "exceptions-corrupt";

const UNKNOWN_ACTOR: &str = "unknown";

struct StoreState {
    document: ExceptionDocument,
    protected: CompiledProtected,
    rules: RuleIndex,
    /// Maintenance entries not yet written; never part of `document`.
    pending_maintenance: Vec<MaintenanceEntry>,
}

impl StoreState {
    fn compile(document: ExceptionDocument) -> Self {
        let protected = CompiledProtected::compile(document.global.protected.as_ref());
        let rules = RuleIndex::build(&document);
        Self { document, protected, rules, pending_maintenance: Vec::new() }
    }
}

/// Thread-safe exclusion store backed by a `DocumentBackend`.
pub struct ExceptionStore {
    backend: Arc<dyn DocumentBackend>,
    settings: ExceptionConfig,
    persistence: PersistenceConfig,
    chain: ExclusionChain,
    state: RwLock<StoreState>,
    writer: Mutex<()>,
    /// Set when the stored document could not be read at load.
    stale: AtomicBool,
}

impl std::fmt::Debug for ExceptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionStore")
            .field("settings", &self.settings)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl ExceptionStore {
    /// Loads the document and makes sure the protected rule is present and current.
    ///
    /// Never fails. An unreadable or unparsable document degrades to an empty one with a
    /// freshly created protected rule; an unparsable document is copied aside first and
    /// replaced. After a read error nothing is written at load, and the first mutation
    /// reads the stored document again before changing it.
    pub fn load(backend: Arc<dyn DocumentBackend>, config: &GuardConfig) -> Self {
        let mut recovered = false;
        let mut read_failed = false;
        let mut document = match backend.read_document(EXCEPTIONS_DOCUMENT_KEY) {
            Ok(Some(bytes)) => match serde_json::from_slice::<ExceptionDocument>(&bytes) {
                Ok(document) => document,
                Err(e) => {
                    warn!("Exceptions document is corrupt and will be reset: {}", e);
                    if let Err(e) = backend.write_document(CORRUPT_DOCUMENT_KEY, &bytes) {
                        warn!("Could not keep a copy of the corrupt exceptions document: {}", e);
                    }
                    recovered = true;
                    ExceptionDocument::default()
                }
            },
            Ok(None) => {
                info!("No exceptions document found; starting with defaults.");
                ExceptionDocument::default()
            }
            Err(e) => {
                warn!("Exceptions document could not be read, continuing with defaults in memory: {}", e);
                read_failed = true;
                ExceptionDocument::default()
            }
        };

        let reason = if recovered { "re-created after corrupt document" } else { "startup check" };
        let report = ProtectedRule::migrate(
            &mut document.global.protected,
            false,
            SYSTEM_ACTOR,
            reason,
            config.exceptions.history_limit,
        );

        let store = Self {
            backend,
            settings: config.exceptions.clone(),
            persistence: config.persistence,
            chain: ExclusionChain::default(),
            state: RwLock::new(StoreState::compile(document)),
            writer: Mutex::new(()),
            stale: AtomicBool::new(read_failed),
        };

        if read_failed {
            debug!("Skipping the startup write: the stored exceptions document was not read.");
        } else if report.changed || recovered {
            if let Err(e) = store.persist() {
                warn!("Protected rule is active in memory but could not be persisted yet: {}", e);
            }
        }
        store
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_document(&self, document: &ExceptionDocument) -> Result<(), GuardError> {
        let bytes = serde_json::to_vec_pretty(document)?;
        write_with_retry(self.backend.as_ref(), EXCEPTIONS_DOCUMENT_KEY, &bytes, &self.persistence)
    }

    /// Writes the current document, including maintenance entries not written yet.
    pub fn persist(&self) -> Result<(), GuardError> {
        self.mutate(|_| Ok(((), true)))
    }

    /// Replaces the in-memory defaults with the stored document after a failed read at load.
    /// Called with the writer lock held.
    fn reload_if_stale(&self) -> Result<(), GuardError> {
        if !self.stale.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut document = match self.backend.read_document(EXCEPTIONS_DOCUMENT_KEY)? {
            Some(bytes) => serde_json::from_slice::<ExceptionDocument>(&bytes)?,
            None => ExceptionDocument::default(),
        };
        ProtectedRule::migrate(
            &mut document.global.protected,
            false,
            SYSTEM_ACTOR,
            "startup check",
            self.settings.history_limit,
        );
        info!("Exceptions document read after an earlier failure; {} scope(s) restored.", document.scopes.len());

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let pending = std::mem::take(&mut state.pending_maintenance);
        *state = StoreState::compile(document);
        state.pending_maintenance = pending;
        self.stale.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Applies `edit` to a draft, persists the draft if it reports a change, then publishes it.
    fn mutate<T>(
        &self,
        edit: impl FnOnce(&mut ExceptionDocument) -> Result<(T, bool), GuardError>,
    ) -> Result<T, GuardError> {
        let _writer = self.lock_writer();
        self.reload_if_stale()?;
        let mut draft = {
            let state = self.read_state();
            let mut draft = state.document.clone();
            merge_into(
                &mut draft.global.maintenance_history,
                state.pending_maintenance.iter().cloned(),
                self.settings.maintenance_history_limit,
            );
            draft
        };
        let (value, changed) = edit(&mut draft)?;
        if !changed {
            return Ok(value);
        }

        self.write_document(&draft)?;
        let compiled = StoreState::compile(draft);
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = compiled;
        Ok(value)
    }

    /// True when `text` contains a platform identifier or one of the enabled mention syntaxes.
    pub fn is_globally_excluded(&self, text: &str) -> bool {
        self.read_state().protected.matches(text)
    }

    /// True when any enabled user rule for `scope` or `_global` excludes `text`.
    pub fn is_scope_excluded(&self, scope: &str, category: DetectionCategory, text: &str) -> bool {
        self.exclusion_layer(scope, category, text).is_some()
    }

    /// Name of the lookup layer that excludes `text`, for diagnostics.
    pub fn exclusion_layer(&self, scope: &str, category: DetectionCategory, text: &str) -> Option<&'static str> {
        let state = self.read_state();
        self.chain.first_match(&state.rules, scope, category, text)
    }

    /// Adds a user rule. Adding the same kind and value twice returns the existing rule.
    pub fn add_rule(
        &self,
        scope: &str,
        category: &str,
        value: &str,
        kind: RuleKind,
        reason: &str,
        actor: &str,
    ) -> Result<ExclusionRule, GuardError> {
        let scope = scope.trim();
        let category = category.trim();
        let value = value.trim();
        if scope.is_empty() {
            return Err(GuardError::MissingField("scope"));
        }
        if category.is_empty() {
            return Err(GuardError::MissingField("category"));
        }
        if value.is_empty() {
            return Err(GuardError::MissingField("value"));
        }
        if scope == GLOBAL_SCOPE && category == PROTECTED_CATEGORY {
            warn!("Refused to add a rule into the protected global rule (actor '{}').", actor);
            return Err(GuardError::ProtectedRule {
                scope: scope.to_string(),
                category: category.to_string(),
            });
        }
        let key = category.parse::<CategoryKey>()?;
        if kind == RuleKind::Regex {
            compile_user_pattern(value)?;
        }

        let actor = if actor.trim().is_empty() { UNKNOWN_ACTOR } else { actor.trim() };
        let candidate = ExclusionRule {
            id: Uuid::new_v4().to_string(),
            scope: scope.to_string(),
            category: key.as_str().to_string(),
            kind,
            value: value.to_string(),
            added_by: actor.to_string(),
            added_at: Utc::now(),
            reason: reason.trim().to_string(),
            enabled: true,
        };

        let rule = self.mutate(|document| {
            let bucket = document.bucket_mut(scope, key.as_str());
            if let Some(existing) = bucket.iter().find(|r| r.kind == kind && r.value == candidate.value) {
                debug!("Rule '{}' already covers this value in scope '{}'.", existing.id, scope);
                return Ok((existing.clone(), false));
            }
            bucket.push(candidate.clone());
            Ok((candidate, true))
        })?;

        info!("Exclusion rule '{}' ({} {}) added to scope '{}' by '{}'.", rule.id, rule.kind, rule.category, scope, actor);
        Ok(rule)
    }

    /// Removes a user rule. The protected rule can never be removed.
    pub fn remove_rule(&self, scope: &str, category: &str, rule_id: &str, actor: &str) -> Result<(), GuardError> {
        let scope = scope.trim();
        let category = category.trim();
        let rule_id = rule_id.trim();

        let targets_protected = (scope == GLOBAL_SCOPE && category == PROTECTED_CATEGORY)
            || self
                .read_state()
                .document
                .global
                .protected
                .as_ref()
                .is_some_and(|p| p.rule.id == rule_id);
        if targets_protected {
            warn!("Refused removal of the protected global rule requested by '{}'.", actor);
            return Err(GuardError::ProtectedRule {
                scope: scope.to_string(),
                category: category.to_string(),
            });
        }
        if scope.is_empty() {
            return Err(GuardError::MissingField("scope"));
        }
        if category.is_empty() {
            return Err(GuardError::MissingField("category"));
        }
        if rule_id.is_empty() {
            return Err(GuardError::MissingField("ruleId"));
        }

        // Rules under keys that no longer parse can still be removed by their stored key.
        let key = category
            .parse::<CategoryKey>()
            .map(|k| k.as_str().to_string())
            .unwrap_or_else(|_| category.to_string());

        self.mutate(|document| {
            if document.remove(scope, &key, rule_id) {
                Ok(((), true))
            } else {
                Err(GuardError::NotFound {
                    scope: scope.to_string(),
                    category: key.clone(),
                    rule_id: rule_id.to_string(),
                })
            }
        })?;

        info!("Exclusion rule '{}' removed from scope '{}' by '{}'.", rule_id, scope, actor);
        Ok(())
    }

    /// User rules of one scope (`_global` lists the global user rules).
    pub fn list_rules(&self, scope: &str) -> CategoryRules {
        self.read_state()
            .document
            .rules_of(scope)
            .cloned()
            .unwrap_or_default()
    }

    /// Scope ids that hold at least one user rule; `_global` first when it does.
    pub fn scopes(&self) -> Vec<String> {
        let state = self.read_state();
        let mut scopes = Vec::new();
        if !state.document.global.rules.is_empty() {
            scopes.push(GLOBAL_SCOPE.to_string());
        }
        scopes.extend(state.document.scopes.keys().cloned());
        scopes
    }

    pub fn protected_rule(&self) -> Option<ProtectedRule> {
        self.read_state().document.global.protected.clone()
    }

    /// Maintenance entries, oldest first, including ones not written yet.
    pub fn maintenance_history(&self) -> Vec<MaintenanceEntry> {
        let state = self.read_state();
        let mut history = state.document.global.maintenance_history.clone();
        merge_into(&mut history, state.pending_maintenance.iter().cloned(), self.settings.maintenance_history_limit);
        history
    }

    /// Rules that are stored but inactive because they failed to compile.
    pub fn skipped_rules(&self) -> Vec<String> {
        self.read_state().rules.skipped().to_vec()
    }

    /// A copy of the document as last written.
    pub fn snapshot(&self) -> ExceptionDocument {
        self.read_state().document.clone()
    }

    /// Switches the protected rule on or off.
    pub fn set_protected_enabled(&self, enabled: bool, actor: &str) -> Result<ChangeReport, GuardError> {
        let limit = self.settings.history_limit;
        self.mutate(|document| {
            let protected = ensure_present(document, actor, limit);
            let report = protected.set_enabled(enabled, actor, limit);
            Ok((report.clone(), report.changed))
        })
    }

    /// Switches one mention sub-pattern of the protected rule on or off.
    pub fn set_auxiliary_enabled(&self, kind: AuxiliaryKind, enabled: bool, actor: &str) -> Result<ChangeReport, GuardError> {
        let limit = self.settings.history_limit;
        self.mutate(|document| {
            let protected = ensure_present(document, actor, limit);
            let report = protected.set_auxiliary_enabled(kind, enabled, actor, limit);
            Ok((report.clone(), report.changed))
        })
    }

    /// Runs the protected-rule migration and persists the result if it changed anything.
    pub(crate) fn ensure_protected(&self, force: bool, actor: &str, reason: &str) -> Result<ChangeReport, GuardError> {
        let limit = self.settings.history_limit;
        self.mutate(|document| {
            let report = ProtectedRule::migrate(&mut document.global.protected, force, actor, reason, limit);
            Ok((report.clone(), report.changed))
        })
    }

    /// Forced migration plus re-enabling, as one durable change.
    pub(crate) fn repair_protected(&self, actor: &str, reason: &str) -> Result<ChangeReport, GuardError> {
        let limit = self.settings.history_limit;
        self.mutate(|document| {
            let mut report = ProtectedRule::migrate(&mut document.global.protected, true, actor, reason, limit);
            if let Some(protected) = document.global.protected.as_mut() {
                let enabled = protected.set_enabled(true, actor, limit);
                if enabled.changed {
                    report.revision = enabled.revision;
                }
            }
            Ok((report, true))
        })
    }

    /// Appends a maintenance entry. When `persist` is false the entry is held apart from
    /// the document and written with the next durable change.
    pub(crate) fn record_maintenance(&self, entry: MaintenanceEntry, persist: bool) -> Result<(), GuardError> {
        let limit = self.settings.maintenance_history_limit;
        if persist {
            return self.mutate(|document| {
                push_bounded(&mut document.global.maintenance_history, entry, limit);
                Ok(((), true))
            });
        }

        let _writer = self.lock_writer();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        push_bounded(&mut state.pending_maintenance, entry, limit);
        Ok(())
    }

    /// Swaps the published document without migrating or persisting it.
    #[cfg(test)]
    pub(crate) fn replace_unchecked(&self, edit: impl FnOnce(&mut ExceptionDocument)) {
        let _writer = self.lock_writer();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut document = state.document.clone();
        edit(&mut document);
        *state = StoreState::compile(document);
    }
}

fn merge_into(history: &mut Vec<MaintenanceEntry>, entries: impl IntoIterator<Item = MaintenanceEntry>, limit: usize) {
    for entry in entries {
        push_bounded(history, entry, limit);
    }
}

fn ensure_present<'a>(document: &'a mut ExceptionDocument, actor: &str, limit: usize) -> &'a mut ProtectedRule {
    ProtectedRule::migrate(&mut document.global.protected, false, actor, "re-created on demand", limit);
    document
        .global
        .protected
        .get_or_insert_with(|| ProtectedRule::canonical(actor, Utc::now()))
}

/// Grouped view used by listings: category key to rules, for every scope.
pub fn rules_by_scope(store: &ExceptionStore) -> BTreeMap<String, CategoryRules> {
    store
        .scopes()
        .into_iter()
        .map(|scope| {
            let rules = store.list_rules(&scope);
            (scope, rules)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use std::thread;

    fn config() -> GuardConfig {
        let mut config = GuardConfig::default();
        config.persistence.retry_delay_ms = 0;
        config
    }

    fn store_with(backend: Arc<MemoryBackend>) -> ExceptionStore {
        ExceptionStore::load(backend, &config())
    }

    #[test]
    fn test_fresh_store_creates_and_persists_protected_rule() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        assert!(store.protected_rule().is_some());
        assert!(store.is_globally_excluded("id 123456789012345678"));
        assert!(store.is_globally_excluded("<@!123456789012345678>"));
        assert!(!store.is_globally_excluded("call 555-123-4567"));

        let raw = backend.raw(EXCEPTIONS_DOCUMENT_KEY).unwrap();
        let doc: ExceptionDocument = serde_json::from_slice(&raw).unwrap();
        assert_eq!(doc.global.protected.unwrap().version, PROTECTED_RULE_VERSION);
    }

    #[test]
    fn test_corrupt_document_recovers_and_keeps_a_copy() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_raw(EXCEPTIONS_DOCUMENT_KEY, "{ not json");
        let store = store_with(backend.clone());
        assert!(store.is_globally_excluded("123456789012345678"));
        assert_eq!(backend.raw(CORRUPT_DOCUMENT_KEY).unwrap(), b"{ not json".to_vec());
        let raw = backend.raw(EXCEPTIONS_DOCUMENT_KEY).unwrap();
        assert!(serde_json::from_slice::<ExceptionDocument>(&raw).is_ok());
    }

    #[test]
    fn test_add_and_remove_rule() {
        let store = store_with(Arc::new(MemoryBackend::new()));
        let rule = store
            .add_rule("guild-1", "Email", "support@example.com", RuleKind::Exact, "staff address", "mod")
            .unwrap();
        assert_eq!(rule.category, "email");
        assert!(store.is_scope_excluded("guild-1", DetectionCategory::Email, "Support@Example.com"));
        assert!(!store.is_scope_excluded("guild-2", DetectionCategory::Email, "support@example.com"));

        let again = store
            .add_rule("guild-1", "email", "support@example.com", RuleKind::Exact, "", "mod")
            .unwrap();
        assert_eq!(again.id, rule.id);
        assert_eq!(store.list_rules("guild-1")["email"].len(), 1);

        store.remove_rule("guild-1", "email", &rule.id, "mod").unwrap();
        assert!(!store.is_scope_excluded("guild-1", DetectionCategory::Email, "support@example.com"));
        assert!(store.scopes().is_empty());

        let err = store.remove_rule("guild-1", "email", &rule.id, "mod").unwrap_err();
        assert!(matches!(err, GuardError::NotFound { .. }));
    }

    #[test]
    fn test_add_rule_validation() {
        let store = store_with(Arc::new(MemoryBackend::new()));
        assert!(matches!(
            store.add_rule("", "email", "x", RuleKind::Exact, "", "mod"),
            Err(GuardError::MissingField("scope"))
        ));
        assert!(matches!(
            store.add_rule("g", "email", "  ", RuleKind::Exact, "", "mod"),
            Err(GuardError::MissingField("value"))
        ));
        assert!(matches!(
            store.add_rule("g", "email", "([", RuleKind::Regex, "", "mod"),
            Err(GuardError::InvalidExpression { .. })
        ));
        assert!(matches!(
            store.add_rule(GLOBAL_SCOPE, PROTECTED_CATEGORY, r"\d+", RuleKind::Regex, "", "mod"),
            Err(GuardError::ProtectedRule { .. })
        ));
        assert!(matches!(
            store.add_rule("g", "weather", "x", RuleKind::Exact, "", "mod"),
            Err(GuardError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_protected_rule_cannot_be_removed() {
        let store = store_with(Arc::new(MemoryBackend::new()));
        let id = store.protected_rule().unwrap().rule.id;
        for actor in ["mod", "owner", SYSTEM_ACTOR] {
            assert!(matches!(
                store.remove_rule(GLOBAL_SCOPE, PROTECTED_CATEGORY, &id, actor),
                Err(GuardError::ProtectedRule { .. })
            ));
        }
        assert!(matches!(
            store.remove_rule("guild-1", "any", &id, "mod"),
            Err(GuardError::ProtectedRule { .. })
        ));
        assert!(store.is_globally_excluded("123456789012345678"));
    }

    #[test]
    fn test_failed_persist_leaves_memory_unchanged() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        let before = backend.raw(EXCEPTIONS_DOCUMENT_KEY);

        backend.fail_next_writes(10);
        let err = store
            .add_rule("guild-1", "phone", "555-123-4567", RuleKind::Exact, "", "mod")
            .unwrap_err();
        assert!(matches!(err, GuardError::PersistenceFailed { .. }));
        assert!(store.list_rules("guild-1").is_empty());
        assert!(!store.is_scope_excluded("guild-1", DetectionCategory::Phone, "555-123-4567"));
        assert_eq!(backend.raw(EXCEPTIONS_DOCUMENT_KEY), before);
    }

    #[test]
    fn test_read_failure_at_load_does_not_overwrite_stored_rules() {
        let backend = Arc::new(MemoryBackend::new());
        store_with(backend.clone())
            .add_rule("guild-1", "email", "support@example.com", RuleKind::Exact, "", "mod")
            .unwrap();
        let stored = backend.raw(EXCEPTIONS_DOCUMENT_KEY).unwrap();

        backend.fail_next_reads(1);
        let store = store_with(backend.clone());
        assert!(store.is_globally_excluded("123456789012345678"));
        assert!(store.list_rules("guild-1").is_empty());
        assert_eq!(backend.raw(EXCEPTIONS_DOCUMENT_KEY).unwrap(), stored);

        // The first write picks the stored rules back up instead of replacing them.
        store.add_rule("guild-2", "phone", "555-123-4567", RuleKind::Exact, "", "mod").unwrap();
        assert!(store.is_scope_excluded("guild-1", DetectionCategory::Email, "support@example.com"));

        let reloaded = store_with(backend);
        assert_eq!(reloaded.list_rules("guild-1")["email"].len(), 1);
        assert_eq!(reloaded.list_rules("guild-2")["phone"].len(), 1);
    }

    #[test]
    fn test_unwritten_maintenance_entry_stays_out_of_the_document() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        let entry = MaintenanceEntry {
            at: Utc::now(),
            issues_found: 0,
            issues_fixed: 0,
            repaired: false,
            actor: SYSTEM_ACTOR.to_string(),
        };
        store.record_maintenance(entry.clone(), false).unwrap();
        assert_eq!(store.maintenance_history(), vec![entry.clone()]);
        assert!(store.snapshot().global.maintenance_history.is_empty());

        let stored = |backend: &MemoryBackend| -> ExceptionDocument {
            serde_json::from_slice(&backend.raw(EXCEPTIONS_DOCUMENT_KEY).unwrap()).unwrap()
        };

        backend.fail_next_writes(3);
        assert!(store.add_rule("guild-1", "email", "a@example.com", RuleKind::Exact, "", "mod").is_err());
        assert_eq!(store.snapshot(), stored(&backend));
        assert_eq!(store.maintenance_history(), vec![entry.clone()]);

        store.add_rule("guild-1", "email", "a@example.com", RuleKind::Exact, "", "mod").unwrap();
        let written = stored(&backend);
        assert_eq!(written.global.maintenance_history, vec![entry.clone()]);
        assert_eq!(store.snapshot(), written);
        assert_eq!(store.maintenance_history(), vec![entry]);
    }

    #[test]
    fn test_reload_preserves_behaviour() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let store = store_with(backend.clone());
            store.add_rule("guild-1", "any", "example.org", RuleKind::Substring, "", "mod").unwrap();
            store.set_auxiliary_enabled(AuxiliaryKind::CustomEmoji, false, "mod").unwrap();
        }
        let reloaded = store_with(backend);
        assert!(reloaded.is_scope_excluded("guild-1", DetectionCategory::Email, "a@example.org"));
        assert!(reloaded.is_globally_excluded("<#123456789012345678>"));
        assert_eq!(
            reloaded.protected_rule().unwrap().auxiliary_enabled(AuxiliaryKind::CustomEmoji),
            Some(false)
        );
    }

    #[test]
    fn test_toggles_bump_revision() {
        let store = store_with(Arc::new(MemoryBackend::new()));
        let start = store.protected_rule().unwrap().revision;
        let report = store.set_protected_enabled(false, "mod").unwrap();
        assert!(report.changed);
        assert_eq!(report.revision, start + 1);
        assert!(!store.is_globally_excluded("123456789012345678"));

        let noop = store.set_protected_enabled(false, "mod").unwrap();
        assert!(!noop.changed);

        store.set_protected_enabled(true, "mod").unwrap();
        let rule = store.protected_rule().unwrap();
        assert_eq!(rule.revision, start + 2);
        assert_eq!(rule.history.last().unwrap().action, HistoryAction::Enabled);
    }

    #[test]
    fn test_concurrent_add_rule() {
        let store = Arc::new(store_with(Arc::new(MemoryBackend::new())));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .add_rule("guild-1", "email", &format!("user{}@example.com", i), RuleKind::Exact, "", "mod")
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.list_rules("guild-1")["email"].len(), 8);
    }
}
