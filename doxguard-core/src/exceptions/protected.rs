//! The system-protected global exclusion for platform identifiers.
//!
//! The rule is a versioned value object. Every change to it, whether creation at
//! first start, an upgrade to a newer canonical pattern, a forced repair or a
//! moderator toggle, goes through this module so the history log and the revision
//! counter stay consistent.

use chrono::{DateTime, Utc};
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::engines::fast_path;
use crate::exceptions::document::push_bounded;
use crate::exceptions::rule::{ExclusionRule, RuleKind, GLOBAL_SCOPE, PROTECTED_CATEGORY};

/// Current canonical version tag of the protected rule.
pub const PROTECTED_RULE_VERSION: &str = "3.1.0";
/// Canonical pattern: a bare 17-19 digit snowflake identifier. ASCII digits and ASCII
/// word boundaries only, matching the fast path.
pub const CANONICAL_PATTERN: &str = r"(?-u:\b)[0-9]{17,19}(?-u:\b)";
/// Actor recorded for changes the system makes on its own.
pub const SYSTEM_ACTOR: &str = "system";

const PROTECTED_RULE_ID: &str = "global-discord-ids";

/// Platform mention syntaxes that embed an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuxiliaryKind {
    UserMention,
    ChannelMention,
    RoleMention,
    CustomEmoji,
}

impl AuxiliaryKind {
    pub const ALL: [AuxiliaryKind; 4] = [
        AuxiliaryKind::UserMention,
        AuxiliaryKind::ChannelMention,
        AuxiliaryKind::RoleMention,
        AuxiliaryKind::CustomEmoji,
    ];

    pub fn canonical_pattern(self) -> &'static str {
        match self {
            AuxiliaryKind::UserMention => r"<@!?[0-9]{17,19}>",
            AuxiliaryKind::ChannelMention => r"<#[0-9]{17,19}>",
            AuxiliaryKind::RoleMention => r"<@&[0-9]{17,19}>",
            AuxiliaryKind::CustomEmoji => r"<a?:[A-Za-z0-9_]{2,32}:[0-9]{17,19}>",
        }
    }

    /// A mention of this kind wrapping `id`.
    pub fn sample(self, id: &str) -> String {
        match self {
            AuxiliaryKind::UserMention => format!("<@{}>", id),
            AuxiliaryKind::ChannelMention => format!("<#{}>", id),
            AuxiliaryKind::RoleMention => format!("<@&{}>", id),
            AuxiliaryKind::CustomEmoji => format!("<:probe:{}>", id),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuxiliaryKind::UserMention => "userMention",
            AuxiliaryKind::ChannelMention => "channelMention",
            AuxiliaryKind::RoleMention => "roleMention",
            AuxiliaryKind::CustomEmoji => "customEmoji",
        }
    }
}

impl fmt::Display for AuxiliaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuxiliaryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s.chars().filter(|c| *c != '_' && *c != '-').collect::<String>().to_ascii_lowercase();
        match normalized.as_str() {
            "usermention" | "user" => Ok(AuxiliaryKind::UserMention),
            "channelmention" | "channel" => Ok(AuxiliaryKind::ChannelMention),
            "rolemention" | "role" => Ok(AuxiliaryKind::RoleMention),
            "customemoji" | "emoji" => Ok(AuxiliaryKind::CustomEmoji),
            other => Err(format!("unknown auxiliary pattern '{}'", other)),
        }
    }
}

/// One independently toggleable sub-pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxiliaryPattern {
    pub kind: AuxiliaryKind,
    pub pattern: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryAction {
    Created,
    Updated,
    Repaired,
    Enabled,
    Disabled,
    AuxiliaryEnabled,
    AuxiliaryDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub action: HistoryAction,
    pub from_version: Option<String>,
    pub to_version: String,
    pub revision: u64,
    pub actor: String,
    #[serde(default)]
    pub note: String,
}

/// The distinguished global exclusion rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedRule {
    #[serde(flatten)]
    pub rule: ExclusionRule,
    pub version: String,
    /// Incremented on every change; never decreases.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub system_protected: bool,
    #[serde(default)]
    pub auxiliary: Vec<AuxiliaryPattern>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// What a call that may touch the protected rule actually did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReport {
    pub changed: bool,
    pub action: Option<HistoryAction>,
    pub previous_version: Option<String>,
    pub current_version: String,
    pub revision: u64,
}

impl ChangeReport {
    fn unchanged(rule: &ProtectedRule) -> Self {
        Self {
            changed: false,
            action: None,
            previous_version: Some(rule.version.clone()),
            current_version: rule.version.clone(),
            revision: rule.revision,
        }
    }
}

impl ProtectedRule {
    /// A fresh rule in canonical shape with an empty history at revision 0.
    pub fn canonical(actor: &str, now: DateTime<Utc>) -> Self {
        Self {
            rule: ExclusionRule {
                id: PROTECTED_RULE_ID.to_string(),
                scope: GLOBAL_SCOPE.to_string(),
                category: PROTECTED_CATEGORY.to_string(),
                kind: RuleKind::Regex,
                value: CANONICAL_PATTERN.to_string(),
                added_by: actor.to_string(),
                added_at: now,
                reason: "Platform identifiers are not personal information".to_string(),
                enabled: true,
            },
            version: PROTECTED_RULE_VERSION.to_string(),
            revision: 0,
            system_protected: true,
            auxiliary: AuxiliaryKind::ALL
                .iter()
                .map(|&kind| AuxiliaryPattern {
                    kind,
                    pattern: kind.canonical_pattern().to_string(),
                    enabled: true,
                })
                .collect(),
            history: Vec::new(),
        }
    }

    /// True when version, pattern and sub-patterns are all canonical.
    pub fn is_current(&self) -> bool {
        self.version == PROTECTED_RULE_VERSION
            && self.rule.value == CANONICAL_PATTERN
            && self.auxiliary.iter().all(|a| a.pattern == a.kind.canonical_pattern())
    }

    /// Structural problems that require rewriting the rule.
    pub fn defects(&self) -> Vec<String> {
        let mut defects = Vec::new();
        if let Err(e) = Regex::new(&self.rule.value) {
            defects.push(format!("pattern does not compile: {}", e));
        }
        if self.rule.kind != RuleKind::Regex {
            defects.push(format!("rule kind is '{}' instead of 'regex'", self.rule.kind));
        }
        if !self.system_protected {
            defects.push("rule is not marked system protected".to_string());
        }
        if self.rule.scope != GLOBAL_SCOPE || self.rule.category != PROTECTED_CATEGORY {
            defects.push(format!("rule is filed under '{}/{}'", self.rule.scope, self.rule.category));
        }
        for kind in AuxiliaryKind::ALL {
            let entries: Vec<&AuxiliaryPattern> = self.auxiliary.iter().filter(|a| a.kind == kind).collect();
            match entries.as_slice() {
                [] => defects.push(format!("auxiliary pattern '{}' is missing", kind)),
                [single] => {
                    if let Err(e) = Regex::new(&single.pattern) {
                        defects.push(format!("auxiliary pattern '{}' does not compile: {}", kind, e));
                    }
                }
                _ => defects.push(format!("auxiliary pattern '{}' is defined more than once", kind)),
            }
        }
        defects
    }

    pub fn auxiliary_enabled(&self, kind: AuxiliaryKind) -> Option<bool> {
        self.auxiliary.iter().find(|a| a.kind == kind).map(|a| a.enabled)
    }

    fn record(&mut self, action: HistoryAction, from_version: Option<String>, actor: &str, note: String, limit: usize) -> ChangeReport {
        self.revision += 1;
        let entry = HistoryEntry {
            at: Utc::now(),
            action,
            from_version: from_version.clone(),
            to_version: self.version.clone(),
            revision: self.revision,
            actor: actor.to_string(),
            note,
        };
        push_bounded(&mut self.history, entry, limit);
        ChangeReport {
            changed: true,
            action: Some(action),
            previous_version: from_version,
            current_version: self.version.clone(),
            revision: self.revision,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool, actor: &str, history_limit: usize) -> ChangeReport {
        if self.rule.enabled == enabled {
            return ChangeReport::unchanged(self);
        }
        self.rule.enabled = enabled;
        let action = if enabled { HistoryAction::Enabled } else { HistoryAction::Disabled };
        info!("Protected rule {} by '{}'.", if enabled { "enabled" } else { "disabled" }, actor);
        self.record(action, Some(self.version.clone()), actor, String::new(), history_limit)
    }

    pub fn set_auxiliary_enabled(&mut self, kind: AuxiliaryKind, enabled: bool, actor: &str, history_limit: usize) -> ChangeReport {
        let Some(aux) = self.auxiliary.iter_mut().find(|a| a.kind == kind) else {
            return ChangeReport::unchanged(self);
        };
        if aux.enabled == enabled {
            return ChangeReport::unchanged(self);
        }
        aux.enabled = enabled;
        let action = if enabled { HistoryAction::AuxiliaryEnabled } else { HistoryAction::AuxiliaryDisabled };
        self.record(action, Some(self.version.clone()), actor, kind.to_string(), history_limit)
    }

    /// Brings the protected rule in `slot` to canonical shape.
    ///
    /// * absent: created enabled.
    /// * defective (pattern does not compile, wrong kind, missing sub-pattern...): repaired.
    /// * outdated version, pattern or sub-pattern: updated.
    /// * otherwise unchanged, unless `force` is set, which rewrites it as a repair.
    ///
    /// The enabled flag, sub-pattern toggles, id and history survive every rewrite.
    pub fn migrate(
        slot: &mut Option<ProtectedRule>,
        force: bool,
        actor: &str,
        reason: &str,
        history_limit: usize,
    ) -> ChangeReport {
        let now = Utc::now();
        let Some(existing) = slot.take() else {
            let mut created = ProtectedRule::canonical(actor, now);
            let report = created.record(HistoryAction::Created, None, actor, reason.to_string(), history_limit);
            info!("Protected global rule created at version {} ({}).", PROTECTED_RULE_VERSION, reason);
            *slot = Some(created);
            return report;
        };

        let defects = existing.defects();
        let outdated = !existing.is_current();
        if defects.is_empty() && !outdated && !force {
            let report = ChangeReport::unchanged(&existing);
            *slot = Some(existing);
            return report;
        }

        let action = if !defects.is_empty() {
            warn!("Protected global rule is defective and will be repaired: {}", defects.join("; "));
            HistoryAction::Repaired
        } else if outdated {
            HistoryAction::Updated
        } else {
            HistoryAction::Repaired
        };

        let toggles: HashMap<AuxiliaryKind, bool> = existing
            .auxiliary
            .iter()
            .rev()
            .map(|a| (a.kind, a.enabled))
            .collect();

        let mut upgraded = ProtectedRule::canonical(actor, now);
        if !existing.rule.id.is_empty() {
            upgraded.rule.id = existing.rule.id.clone();
        }
        upgraded.rule.added_by = existing.rule.added_by.clone();
        upgraded.rule.added_at = existing.rule.added_at;
        upgraded.rule.enabled = existing.rule.enabled;
        for aux in upgraded.auxiliary.iter_mut() {
            aux.enabled = toggles.get(&aux.kind).copied().unwrap_or(true);
        }
        upgraded.revision = existing.revision;
        upgraded.history = existing.history;

        let note = if defects.is_empty() {
            reason.to_string()
        } else {
            format!("{} (defects: {})", reason, defects.join("; "))
        };
        let report = upgraded.record(action, Some(existing.version), actor, note, history_limit);
        info!(
            "Protected global rule {:?} from {:?} to {} at revision {}.",
            action, report.previous_version, PROTECTED_RULE_VERSION, report.revision
        );
        *slot = Some(upgraded);
        report
    }
}

/// The compiled, read-side view of the protected rule.
#[derive(Debug, Clone)]
pub(crate) struct CompiledProtected {
    enabled: bool,
    /// `None` only if even the canonical pattern failed to compile; the fast path then stands in.
    main: Option<Regex>,
    auxiliary: Vec<(AuxiliaryKind, Regex)>,
}

impl CompiledProtected {
    pub(crate) fn compile(rule: Option<&ProtectedRule>) -> Self {
        let Some(rule) = rule else {
            warn!("No protected rule present; excluding identifiers with the canonical pattern.");
            return Self {
                enabled: true,
                main: Regex::new(CANONICAL_PATTERN).ok(),
                auxiliary: Vec::new(),
            };
        };

        let main = Regex::new(&rule.rule.value)
            .or_else(|e| {
                warn!("Protected pattern does not compile ({}); falling back to the canonical pattern.", e);
                Regex::new(CANONICAL_PATTERN)
            })
            .ok();

        let auxiliary = rule
            .auxiliary
            .iter()
            .filter(|a| a.enabled)
            .filter_map(|a| match Regex::new(&a.pattern) {
                Ok(regex) => Some((a.kind, regex)),
                Err(e) => {
                    warn!("Auxiliary pattern '{}' does not compile and is ignored: {}", a.kind, e);
                    None
                }
            })
            .collect();

        Self {
            enabled: rule.rule.enabled,
            main,
            auxiliary,
        }
    }

    pub(crate) fn matches(&self, text: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let main_hit = match &self.main {
            Some(regex) => regex.is_match(text),
            None => fast_path::contains_platform_identifier(text),
        };
        main_hit || self.auxiliary.iter().any(|(_, regex)| regex.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created() -> Option<ProtectedRule> {
        let mut slot = None;
        ProtectedRule::migrate(&mut slot, false, SYSTEM_ACTOR, "test", 10);
        slot
    }

    #[test]
    fn test_create_when_absent() {
        let mut slot = None;
        let report = ProtectedRule::migrate(&mut slot, false, SYSTEM_ACTOR, "first start", 10);
        assert!(report.changed);
        assert_eq!(report.action, Some(HistoryAction::Created));
        let rule = slot.unwrap();
        assert!(rule.system_protected);
        assert!(rule.rule.enabled);
        assert_eq!(rule.revision, 1);
        assert_eq!(rule.history.len(), 1);
        assert!(rule.defects().is_empty());
    }

    #[test]
    fn test_second_migration_is_a_no_op() {
        let mut slot = created();
        let report = ProtectedRule::migrate(&mut slot, false, SYSTEM_ACTOR, "again", 10);
        assert!(!report.changed);
        assert_eq!(slot.unwrap().revision, 1);
    }

    #[test]
    fn test_outdated_rule_is_updated_preserving_toggles() {
        let mut slot = created();
        {
            let rule = slot.as_mut().unwrap();
            rule.version = "2.0.0".to_string();
            rule.rule.value = r"\d{18}".to_string();
            rule.rule.enabled = false;
            rule.auxiliary[3].enabled = false;
        }
        let report = ProtectedRule::migrate(&mut slot, false, SYSTEM_ACTOR, "upgrade", 10);
        assert_eq!(report.action, Some(HistoryAction::Updated));
        assert_eq!(report.previous_version.as_deref(), Some("2.0.0"));
        let rule = slot.unwrap();
        assert_eq!(rule.rule.value, CANONICAL_PATTERN);
        assert!(!rule.rule.enabled);
        assert_eq!(rule.auxiliary_enabled(AuxiliaryKind::CustomEmoji), Some(false));
        assert_eq!(rule.auxiliary_enabled(AuxiliaryKind::UserMention), Some(true));
        assert_eq!(rule.revision, 2);
    }

    #[test]
    fn test_broken_pattern_is_repaired() {
        let mut slot = created();
        slot.as_mut().unwrap().rule.value = "([".to_string();
        let report = ProtectedRule::migrate(&mut slot, false, SYSTEM_ACTOR, "check", 10);
        assert_eq!(report.action, Some(HistoryAction::Repaired));
        assert!(slot.unwrap().defects().is_empty());
    }

    #[test]
    fn test_force_rewrites_current_rule() {
        let mut slot = created();
        let report = ProtectedRule::migrate(&mut slot, true, "moderator", "forced", 10);
        assert_eq!(report.action, Some(HistoryAction::Repaired));
        assert_eq!(slot.unwrap().history.last().unwrap().actor, "moderator");
    }

    #[test]
    fn test_history_is_capped() {
        let mut slot = created();
        for _ in 0..10 {
            ProtectedRule::migrate(&mut slot, true, SYSTEM_ACTOR, "churn", 3);
        }
        let rule = slot.unwrap();
        assert_eq!(rule.history.len(), 3);
        assert_eq!(rule.revision, 11);
        assert_eq!(rule.history.last().unwrap().revision, 11);
    }

    #[test]
    fn test_compiled_respects_toggles() {
        let mut rule = created().unwrap();
        let compiled = CompiledProtected::compile(Some(&rule));
        assert!(compiled.matches("123456789012345678"));
        assert!(compiled.matches("<#123456789012345678>"));
        assert!(!compiled.matches("12345"));

        rule.set_enabled(false, "mod", 10);
        assert!(!CompiledProtected::compile(Some(&rule)).matches("123456789012345678"));
    }

    #[test]
    fn test_serialized_shape_is_flat() {
        let rule = created().unwrap();
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["category"], "discordIds");
        assert_eq!(value["systemProtected"], true);
        assert_eq!(value["version"], PROTECTED_RULE_VERSION);
        let back: ProtectedRule = serde_json::from_value(value).unwrap();
        assert_eq!(back, rule);
    }
}
