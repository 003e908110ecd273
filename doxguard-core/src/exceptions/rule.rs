//! Exclusion rules added by moderators, and their compiled matchers.

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::DetectionCategory;
use crate::errors::GuardError;

/// Reserved scope key holding the protected rule and global user rules.
pub const GLOBAL_SCOPE: &str = "_global";
/// Category key of the protected platform-identifier rule inside `_global`.
pub const PROTECTED_CATEGORY: &str = "discordIds";
/// Category key matching every detection category.
pub const ANY_CATEGORY: &str = "any";

/// Maximum allowed length for a user-supplied regex pattern.
pub const MAX_PATTERN_LENGTH: usize = 500;

/// How a rule's value is compared against candidate text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Case-insensitive equality with the trimmed candidate.
    Exact,
    /// Case-insensitive containment.
    Substring,
    Regex,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleKind::Exact => "exact",
            RuleKind::Substring => "substring",
            RuleKind::Regex => "regex",
        };
        f.write_str(s)
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(RuleKind::Exact),
            "substring" | "pattern" | "contains" => Ok(RuleKind::Substring),
            "regex" | "regexp" => Ok(RuleKind::Regex),
            other => Err(format!("unknown rule kind '{}'", other)),
        }
    }
}

/// The category a rule applies to: one detection category or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryKey {
    Any,
    Category(DetectionCategory),
}

impl CategoryKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKey::Any => ANY_CATEGORY,
            CategoryKey::Category(c) => c.as_str(),
        }
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryKey {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case(ANY_CATEGORY) || s.trim() == "*" {
            return Ok(CategoryKey::Any);
        }
        s.trim().parse::<DetectionCategory>().map(CategoryKey::Category)
    }
}

fn enabled_by_default() -> bool {
    true
}

/// A moderator-defined exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionRule {
    pub id: String,
    pub scope: String,
    pub category: String,
    pub kind: RuleKind,
    pub value: String,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

/// Compiles a user-supplied pattern with the same limits the built-in catalog uses.
pub fn compile_user_pattern(pattern: &str) -> Result<Regex, GuardError> {
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(GuardError::InvalidExpression {
            pattern: pattern.to_string(),
            reason: format!("pattern length ({}) exceeds maximum allowed ({})", pattern.len(), MAX_PATTERN_LENGTH),
        });
    }
    RegexBuilder::new(pattern)
        .size_limit(10 * (1 << 20))
        .build()
        .map_err(|e| GuardError::InvalidExpression {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// A rule ready to be evaluated against candidate text.
#[derive(Debug, Clone)]
pub(crate) enum RuleMatcher {
    Exact(String),
    Substring(String),
    Pattern(Regex),
}

impl RuleMatcher {
    pub(crate) fn compile(rule: &ExclusionRule) -> Result<Self, GuardError> {
        Ok(match rule.kind {
            RuleKind::Exact => RuleMatcher::Exact(rule.value.trim().to_lowercase()),
            RuleKind::Substring => RuleMatcher::Substring(rule.value.to_lowercase()),
            RuleKind::Regex => RuleMatcher::Pattern(compile_user_pattern(&rule.value)?),
        })
    }

    pub(crate) fn matches(&self, text: &str) -> bool {
        match self {
            RuleMatcher::Exact(value) => text.trim().to_lowercase() == *value,
            RuleMatcher::Substring(value) => text.to_lowercase().contains(value.as_str()),
            RuleMatcher::Pattern(regex) => regex.is_match(text),
        }
    }
}
