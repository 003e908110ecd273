//! Ordered lookup of user exclusion rules.
//!
//! A candidate is checked against each layer in turn and the first layer that
//! excludes it wins. Layers only see the compiled `RuleIndex`, never the document.

use log::warn;
use std::collections::HashMap;

use crate::catalog::DetectionCategory;
use crate::exceptions::document::ExceptionDocument;
use crate::exceptions::rule::{CategoryKey, RuleMatcher, ANY_CATEGORY, GLOBAL_SCOPE};

/// Enabled user rules compiled for lookup, keyed by scope then category key.
#[derive(Debug, Default)]
pub(crate) struct RuleIndex {
    by_scope: HashMap<String, HashMap<&'static str, Vec<RuleMatcher>>>,
    /// `scope/category/id` of rules that could not be compiled.
    skipped: Vec<String>,
}

impl RuleIndex {
    pub(crate) fn build(document: &ExceptionDocument) -> Self {
        let mut index = RuleIndex::default();
        let scopes = std::iter::once((GLOBAL_SCOPE, &document.global.rules))
            .chain(document.scopes.iter().map(|(scope, rules)| (scope.as_str(), rules)));

        for (scope, categories) in scopes {
            for (category, rules) in categories {
                let key = match category.parse::<CategoryKey>() {
                    Ok(key) => key.as_str(),
                    Err(_) => {
                        warn!("Ignoring {} rule(s) under unknown category '{}' in scope '{}'.", rules.len(), category, scope);
                        index.skipped.extend(rules.iter().map(|r| format!("{}/{}/{}", scope, category, r.id)));
                        continue;
                    }
                };
                for rule in rules.iter().filter(|r| r.enabled) {
                    match RuleMatcher::compile(rule) {
                        Ok(matcher) => index
                            .by_scope
                            .entry(scope.to_string())
                            .or_default()
                            .entry(key)
                            .or_default()
                            .push(matcher),
                        Err(e) => {
                            warn!("Skipping exclusion rule '{}' in scope '{}': {}", rule.id, scope, e);
                            index.skipped.push(format!("{}/{}/{}", scope, category, rule.id));
                        }
                    }
                }
            }
        }
        index
    }

    fn matches(&self, scope: &str, key: &str, text: &str) -> bool {
        self.by_scope
            .get(scope)
            .and_then(|categories| categories.get(key))
            .is_some_and(|matchers| matchers.iter().any(|m| m.matches(text)))
    }

    pub(crate) fn skipped(&self) -> &[String] {
        &self.skipped
    }
}

/// One step of the exclusion lookup.
pub(crate) trait ExclusionLayer: Send + Sync {
    fn name(&self) -> &'static str;

    fn excludes(&self, index: &RuleIndex, scope: &str, category: DetectionCategory, text: &str) -> bool;
}

/// Rules of the requested scope for the candidate's category.
struct ScopeCategoryLayer;
/// Rules of the requested scope filed under `any`.
struct ScopeAnyLayer;
/// Global user rules for the candidate's category.
struct GlobalCategoryLayer;
/// Global user rules filed under `any`.
struct GlobalAnyLayer;

impl ExclusionLayer for ScopeCategoryLayer {
    fn name(&self) -> &'static str {
        "scope/category"
    }

    fn excludes(&self, index: &RuleIndex, scope: &str, category: DetectionCategory, text: &str) -> bool {
        scope != GLOBAL_SCOPE && index.matches(scope, category.as_str(), text)
    }
}

impl ExclusionLayer for ScopeAnyLayer {
    fn name(&self) -> &'static str {
        "scope/any"
    }

    fn excludes(&self, index: &RuleIndex, scope: &str, _category: DetectionCategory, text: &str) -> bool {
        scope != GLOBAL_SCOPE && index.matches(scope, ANY_CATEGORY, text)
    }
}

impl ExclusionLayer for GlobalCategoryLayer {
    fn name(&self) -> &'static str {
        "global/category"
    }

    fn excludes(&self, index: &RuleIndex, _scope: &str, category: DetectionCategory, text: &str) -> bool {
        index.matches(GLOBAL_SCOPE, category.as_str(), text)
    }
}

impl ExclusionLayer for GlobalAnyLayer {
    fn name(&self) -> &'static str {
        "global/any"
    }

    fn excludes(&self, index: &RuleIndex, _scope: &str, _category: DetectionCategory, text: &str) -> bool {
        index.matches(GLOBAL_SCOPE, ANY_CATEGORY, text)
    }
}

pub(crate) struct ExclusionChain {
    layers: Vec<Box<dyn ExclusionLayer>>,
}

impl ExclusionChain {
    /// Name of the first layer that excludes `text`, if any.
    pub(crate) fn first_match(
        &self,
        index: &RuleIndex,
        scope: &str,
        category: DetectionCategory,
        text: &str,
    ) -> Option<&'static str> {
        self.layers
            .iter()
            .find(|layer| layer.excludes(index, scope, category, text))
            .map(|layer| layer.name())
    }
}

impl Default for ExclusionChain {
    fn default() -> Self {
        Self {
            layers: vec![
                Box::new(ScopeCategoryLayer),
                Box::new(ScopeAnyLayer),
                Box::new(GlobalCategoryLayer),
                Box::new(GlobalAnyLayer),
            ],
        }
    }
}

impl std::fmt::Debug for ExclusionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.layers.iter().map(|l| l.name())).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exceptions::rule::{ExclusionRule, RuleKind};
    use chrono::Utc;

    fn add(doc: &mut ExceptionDocument, scope: &str, category: &str, kind: RuleKind, value: &str) {
        doc.bucket_mut(scope, category).push(ExclusionRule {
            id: format!("{}-{}", scope, value),
            scope: scope.to_string(),
            category: category.to_string(),
            kind,
            value: value.to_string(),
            added_by: "mod".to_string(),
            added_at: Utc::now(),
            reason: String::new(),
            enabled: true,
        });
    }

    #[test]
    fn test_layers_resolve_in_order() {
        let mut doc = ExceptionDocument::default();
        add(&mut doc, "guild", "email", RuleKind::Exact, "a@b.io");
        add(&mut doc, "guild", "any", RuleKind::Substring, "example.org");
        add(&mut doc, "_global", "phone", RuleKind::Regex, r"^555");
        add(&mut doc, "_global", "any", RuleKind::Substring, "noreply");
        let index = RuleIndex::build(&doc);
        let chain = ExclusionChain::default();

        let hit = |scope: &str, category, text: &str| chain.first_match(&index, scope, category, text);
        assert_eq!(hit("guild", DetectionCategory::Email, "A@B.io"), Some("scope/category"));
        assert_eq!(hit("guild", DetectionCategory::Email, "x@example.org"), Some("scope/any"));
        assert_eq!(hit("other", DetectionCategory::Email, "x@example.org"), None);
        assert_eq!(hit("other", DetectionCategory::Phone, "555-123-4567"), Some("global/category"));
        assert_eq!(hit("other", DetectionCategory::Email, "noreply@x.io"), Some("global/any"));
        assert_eq!(hit("guild", DetectionCategory::Phone, "a@b.io"), None);
    }

    #[test]
    fn test_disabled_and_broken_rules_are_ignored() {
        let mut doc = ExceptionDocument::default();
        add(&mut doc, "guild", "email", RuleKind::Regex, "([");
        add(&mut doc, "guild", "bogus", RuleKind::Exact, "a@b.io");
        add(&mut doc, "guild", "phone", RuleKind::Exact, "555-123-4567");
        doc.bucket_mut("guild", "phone")[0].enabled = false;

        let index = RuleIndex::build(&doc);
        assert_eq!(index.skipped().len(), 2);
        let chain = ExclusionChain::default();
        assert_eq!(chain.first_match(&index, "guild", DetectionCategory::Phone, "555-123-4567"), None);
    }
}
