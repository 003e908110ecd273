// doxguard-core/src/engines/regex_engine.rs
//! A `DetectionEngine` implementation that applies the compiled pattern catalog
//! and filters candidates through the exception store.
//! License: MIT OR APACHE 2.0

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{DetectionCategory, PatternCatalog};
use crate::config::DetectionConfig;
use crate::detection_match::{log_detection_debug, log_suppressed_debug, DetectionMatch, ScanResult};
use crate::engine::DetectionEngine;
use crate::exceptions::ExceptionStore;
use crate::risk::weighted_score;

#[derive(Debug)]
pub struct RegexEngine {
    catalog: PatternCatalog,
    store: Arc<ExceptionStore>,
    options: DetectionConfig,
}

impl RegexEngine {
    pub fn new(store: Arc<ExceptionStore>) -> Self {
        Self::with_options(store, DetectionConfig::default())
    }

    pub fn with_options(store: Arc<ExceptionStore>, options: DetectionConfig) -> Self {
        Self {
            catalog: PatternCatalog::new(options.address_enabled),
            store,
            options,
        }
    }

    pub fn store(&self) -> &Arc<ExceptionStore> {
        &self.store
    }

    pub fn options(&self) -> &DetectionConfig {
        &self.options
    }

    /// Surviving matches of one category, with overlapping spans collapsed.
    fn scan_category<'t>(
        &self,
        text: &'t str,
        scope: &str,
        category: DetectionCategory,
        global_memo: &mut HashMap<&'t str, bool>,
    ) -> Vec<DetectionMatch> {
        let mut accepted: Vec<DetectionMatch> = Vec::new();

        for matcher in self.catalog.rules_for(category) {
            for (start, end) in matcher.find_spans(text) {
                if accepted.iter().any(|m| start < m.end && m.start < end) {
                    continue;
                }
                let candidate = &text[start..end];

                let globally_excluded = *global_memo
                    .entry(candidate)
                    .or_insert_with(|| self.store.is_globally_excluded(candidate));
                if globally_excluded {
                    log_suppressed_debug(module_path!(), "global", category, candidate);
                    continue;
                }
                if let Some(layer) = self.store.exclusion_layer(scope, category, candidate) {
                    log_suppressed_debug(module_path!(), layer, category, candidate);
                    continue;
                }

                let m = DetectionMatch::new(category, candidate, start, end, self.options.mask_char);
                log_detection_debug(module_path!(), matcher.name, candidate, &m.censored);
                accepted.push(m);
            }
        }
        accepted
    }
}

impl DetectionEngine for RegexEngine {
    fn scan(&self, text: &str, scope: &str) -> ScanResult {
        if text.trim().is_empty() {
            return ScanResult::empty();
        }

        let mut global_memo: HashMap<&str, bool> = HashMap::new();
        let mut matches: Vec<DetectionMatch> = Vec::new();
        for category in self.catalog.categories() {
            matches.extend(self.scan_category(text, scope, category, &mut global_memo));
        }
        matches.sort_by_key(|m| (m.start, m.category));

        let score = weighted_score(&matches);
        let risk_level = self.options.risk_thresholds.level_for(score);
        ScanResult {
            detected: !matches.is_empty(),
            matches,
            risk_level,
            score,
        }
    }

    fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;
    use crate::exceptions::{AuxiliaryKind, RuleKind};
    use crate::risk::RiskLevel;
    use crate::storage::MemoryBackend;

    fn engine() -> RegexEngine {
        let store = Arc::new(ExceptionStore::load(Arc::new(MemoryBackend::new()), &GuardConfig::default()));
        RegexEngine::new(store)
    }

    #[test]
    fn test_empty_and_whitespace_text() {
        let engine = engine();
        for text in ["", "   ", "\n\t"] {
            let result = engine.scan(text, "guild");
            assert!(!result.detected);
            assert_eq!(result.risk_level, RiskLevel::None);
        }
    }

    #[test]
    fn test_platform_identifiers_are_not_personal_information() {
        let engine = engine();
        for text in [
            "ping 123456789012345678",
            "<@!1234567890123456789> said hi in <#12345678901234567>",
            "<a:party:123456789012345678> <@&123456789012345678>",
        ] {
            let result = engine.scan(text, "guild");
            assert!(!result.detected, "detected something in {:?}: {:?}", text, result.matches);
        }
    }

    #[test]
    fn test_card_is_censored_except_last_four() {
        let result = engine().scan("card: 4111-1111-1111-1111 thanks", "guild");
        assert!(result.detected);
        let card: Vec<_> = result
            .matches
            .iter()
            .filter(|m| m.category == DetectionCategory::CreditCard)
            .collect();
        assert_eq!(card.len(), 1);
        assert_eq!(card[0].censored, "****-****-****-1111");
        assert_eq!(result.count_for(DetectionCategory::SocialSecurityNumber), 0);
        assert_eq!(result.count_for(DetectionCategory::Phone), 0);
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_risk_accumulates_across_categories() {
        let result = engine().scan("mail me at jane@example.com or call (555) 123-4567, ssn 123-45-6789", "guild");
        assert_eq!(result.score, 1 + 2 + 5);
        assert_eq!(result.risk_level, RiskLevel::Critical);
        let starts: Vec<usize> = result.matches.iter().map(|m| m.start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn test_scope_exclusion_only_applies_to_its_scope() {
        let engine = engine();
        engine
            .store()
            .add_rule("guild-1", "email", "support@example.com", RuleKind::Exact, "", "mod")
            .unwrap();
        let text = "write to support@example.com";
        assert!(!engine.scan(text, "guild-1").detected);
        assert!(engine.scan(text, "guild-2").detected);
    }

    #[test]
    fn test_any_rule_only_suppresses_the_matching_candidate() {
        let engine = engine();
        engine
            .store()
            .add_rule("guild-1", "any", "example.com", RuleKind::Substring, "", "mod")
            .unwrap();
        let result = engine.scan("support@example.com and (555) 123-4567", "guild-1");
        assert_eq!(result.count_for(DetectionCategory::Email), 0);
        assert_eq!(result.count_for(DetectionCategory::Phone), 1);
    }

    #[test]
    fn test_address_is_off_unless_enabled() {
        let text = "I live at 221 Baker Street";
        assert!(!engine().scan(text, "g").detected);

        let store = Arc::new(ExceptionStore::load(Arc::new(MemoryBackend::new()), &GuardConfig::default()));
        let options = DetectionConfig { address_enabled: true, ..DetectionConfig::default() };
        let result = RegexEngine::with_options(store, options).scan(text, "g");
        assert_eq!(result.count_for(DetectionCategory::Address), 1);
        assert_eq!(result.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_disabled_mention_pattern_still_excludes_the_bare_identifier() {
        let engine = engine();
        engine
            .store()
            .set_auxiliary_enabled(AuxiliaryKind::UserMention, false, "mod")
            .unwrap();
        assert!(!engine.scan("<@123456789012345678>", "g").detected);
    }
}
