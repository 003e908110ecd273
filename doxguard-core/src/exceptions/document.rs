//! The persisted shape of the exceptions document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::exceptions::protected::ProtectedRule;
use crate::exceptions::rule::{ExclusionRule, GLOBAL_SCOPE};

/// Rules of one scope, keyed by category key (`phone`, `email`, ..., `any`).
pub type CategoryRules = BTreeMap<String, Vec<ExclusionRule>>;

/// One run of the guardian's maintenance cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceEntry {
    pub at: DateTime<Utc>,
    pub issues_found: usize,
    pub issues_fixed: usize,
    pub repaired: bool,
    pub actor: String,
}

/// The reserved `_global` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSection {
    #[serde(rename = "discordIds", default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<ProtectedRule>,
    #[serde(default)]
    pub maintenance_history: Vec<MaintenanceEntry>,
    /// Global user rules, flattened next to the reserved keys.
    #[serde(flatten)]
    pub rules: CategoryRules,
}

/// `{ "_global": {...}, "<scope id>": { "<category>": [rules] } }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionDocument {
    #[serde(rename = "_global", default)]
    pub global: GlobalSection,
    #[serde(flatten)]
    pub scopes: BTreeMap<String, CategoryRules>,
}

impl ExceptionDocument {
    /// The rules of `scope`, treating `_global` as the global user rules.
    pub fn rules_of(&self, scope: &str) -> Option<&CategoryRules> {
        if scope == GLOBAL_SCOPE {
            Some(&self.global.rules)
        } else {
            self.scopes.get(scope)
        }
    }

    pub(crate) fn bucket_mut(&mut self, scope: &str, category: &str) -> &mut Vec<ExclusionRule> {
        let rules = if scope == GLOBAL_SCOPE {
            &mut self.global.rules
        } else {
            self.scopes.entry(scope.to_string()).or_default()
        };
        rules.entry(category.to_string()).or_default()
    }

    /// Removes a rule by id; returns false when there was nothing to remove.
    pub(crate) fn remove(&mut self, scope: &str, category: &str, rule_id: &str) -> bool {
        let rules = if scope == GLOBAL_SCOPE {
            &mut self.global.rules
        } else {
            match self.scopes.get_mut(scope) {
                Some(rules) => rules,
                None => return false,
            }
        };
        let Some(bucket) = rules.get_mut(category) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|r| r.id != rule_id);
        let removed = bucket.len() != before;

        if bucket.is_empty() {
            rules.remove(category);
        }
        if scope != GLOBAL_SCOPE && self.scopes.get(scope).is_some_and(|r| r.is_empty()) {
            self.scopes.remove(scope);
        }
        removed
    }
}

/// Appends `item`, dropping the oldest entries beyond `limit`.
pub(crate) fn push_bounded<T>(entries: &mut Vec<T>, item: T, limit: usize) {
    entries.push(item);
    if entries.len() > limit {
        let excess = entries.len() - limit;
        entries.drain(..excess);
    }
}
