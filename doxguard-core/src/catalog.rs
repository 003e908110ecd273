//! catalog.rs - The static table of detection categories and their compiled matchers.
//!
//! Every category owns an ordered list of regular expressions plus an optional
//! programmatic validator, compiled once on first use and shared by all scans.
//! Numeric matchers are anchored on word boundaries so that none of them fire inside
//! the 17-19 digit identifiers the chat platform uses for users, channels and roles.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, error};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::GuardError;
use crate::validators;

/// A category of personal information the engine can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DetectionCategory {
    #[serde(rename = "phone")]
    Phone,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "ssn")]
    SocialSecurityNumber,
    #[serde(rename = "creditCard")]
    CreditCard,
    #[serde(rename = "address")]
    Address,
    #[serde(rename = "fullName")]
    FullName,
}

impl DetectionCategory {
    /// All categories in scan order.
    pub const ALL: [DetectionCategory; 6] = [
        DetectionCategory::Phone,
        DetectionCategory::Email,
        DetectionCategory::SocialSecurityNumber,
        DetectionCategory::CreditCard,
        DetectionCategory::Address,
        DetectionCategory::FullName,
    ];

    /// Weight used when summing matches into a risk score.
    pub fn risk_weight(self) -> u32 {
        match self {
            DetectionCategory::Phone => 2,
            DetectionCategory::Email => 1,
            DetectionCategory::SocialSecurityNumber => 5,
            DetectionCategory::CreditCard => 5,
            DetectionCategory::Address => 3,
            DetectionCategory::FullName => 2,
        }
    }

    /// Stable key used in persisted documents.
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionCategory::Phone => "phone",
            DetectionCategory::Email => "email",
            DetectionCategory::SocialSecurityNumber => "ssn",
            DetectionCategory::CreditCard => "creditCard",
            DetectionCategory::Address => "address",
            DetectionCategory::FullName => "fullName",
        }
    }

    /// Advisory categories are skipped unless explicitly enabled.
    pub fn is_advisory(self) -> bool {
        matches!(self, DetectionCategory::Address)
    }
}

impl fmt::Display for DetectionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionCategory {
    type Err = GuardError;

    /// Accepts the document keys case-insensitively, plus a few long-form aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "phone" | "phonenumber" => Ok(DetectionCategory::Phone),
            "email" | "emailaddress" => Ok(DetectionCategory::Email),
            "ssn" | "socialsecuritynumber" => Ok(DetectionCategory::SocialSecurityNumber),
            "creditcard" | "card" => Ok(DetectionCategory::CreditCard),
            "address" | "streetaddress" => Ok(DetectionCategory::Address),
            "fullname" | "name" => Ok(DetectionCategory::FullName),
            _ => Err(GuardError::UnknownCategory(s.to_string())),
        }
    }
}

/// A single compiled matching rule for a category.
#[derive(Debug)]
pub struct CategoryMatcher {
    /// Short identifier used in debug logs.
    pub name: &'static str,
    pub regex: Regex,
    /// Capture group holding the sensitive part; 0 means the whole match.
    pub capture_group: usize,
    /// Extra structural check run on the captured text.
    pub validator: Option<fn(&str) -> bool>,
}

impl CategoryMatcher {
    /// Returns `(start, end)` byte spans of every validated hit in `text`.
    pub fn find_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        for caps in self.regex.captures_iter(text) {
            let Some(m) = caps.get(self.capture_group) else { continue; };
            if let Some(validate) = self.validator {
                if !validate(m.as_str()) {
                    debug!("Matcher '{}' rejected a candidate during validation.", self.name);
                    continue;
                }
            }
            spans.push((m.start(), m.end()));
        }
        spans
    }
}

struct MatcherSpec {
    name: &'static str,
    pattern: &'static str,
    capture_group: usize,
    validator: Option<fn(&str) -> bool>,
}

const PHONE_SPECS: &[MatcherSpec] = &[
    MatcherSpec {
        name: "phone_nanp_separated",
        pattern: r"(?:\+1[\s.-]?)?(?:\(\d{3}\)\s?|\b\d{3}[\s.-])\d{3}[\s.-]\d{4}\b",
        capture_group: 0,
        validator: Some(validators::is_plausible_phone_number),
    },
    MatcherSpec {
        name: "phone_international",
        pattern: r"\+\d{1,3}[\s.-]?\d{2,4}[\s.-]\d{3,4}[\s.-]\d{3,4}\b|\+\d{10,14}\b",
        capture_group: 0,
        validator: Some(validators::is_plausible_phone_number),
    },
];

const EMAIL_SPECS: &[MatcherSpec] = &[MatcherSpec {
    name: "email",
    pattern: r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
    capture_group: 0,
    validator: None,
}];

const SSN_SPECS: &[MatcherSpec] = &[MatcherSpec {
    name: "us_ssn",
    pattern: r"\b\d{3}[- ]\d{2}[- ]\d{4}\b",
    capture_group: 0,
    validator: Some(validators::is_valid_ssn_programmatically),
}];

const CREDIT_CARD_SPECS: &[MatcherSpec] = &[
    MatcherSpec {
        name: "card_16_digit",
        pattern: r"\b(?:\d{4}[\s-]?){3}\d{4}\b",
        capture_group: 0,
        validator: Some(validators::is_valid_credit_card_programmatically),
    },
    MatcherSpec {
        name: "card_amex",
        pattern: r"\b3[47]\d{2}[\s-]?\d{6}[\s-]?\d{5}\b",
        capture_group: 0,
        validator: Some(validators::is_valid_credit_card_programmatically),
    },
];

const ADDRESS_SPECS: &[MatcherSpec] = &[MatcherSpec {
    name: "street_address",
    pattern: r"\b\d{1,5}\s+(?:[A-Z][a-z]+\s+){1,3}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Way|Place|Pl)\b",
    capture_group: 0,
    validator: None,
}];

const FULL_NAME_SPECS: &[MatcherSpec] = &[MatcherSpec {
    name: "self_identified_name",
    pattern: r"(?:[Mm]y (?:full |real )?name is|[Nn]ame:)\s+([A-Z][a-z]+(?:[ -][A-Z][a-z]+){1,2})\b",
    capture_group: 1,
    validator: None,
}];

fn specs_for(category: DetectionCategory) -> &'static [MatcherSpec] {
    match category {
        DetectionCategory::Phone => PHONE_SPECS,
        DetectionCategory::Email => EMAIL_SPECS,
        DetectionCategory::SocialSecurityNumber => SSN_SPECS,
        DetectionCategory::CreditCard => CREDIT_CARD_SPECS,
        DetectionCategory::Address => ADDRESS_SPECS,
        DetectionCategory::FullName => FULL_NAME_SPECS,
    }
}

fn compile_spec(spec: &MatcherSpec) -> Option<CategoryMatcher> {
    let built = RegexBuilder::new(spec.pattern)
        .size_limit(10 * (1 << 20))
        .build();
    match built {
        Ok(regex) => Some(CategoryMatcher {
            name: spec.name,
            regex,
            capture_group: spec.capture_group,
            validator: spec.validator,
        }),
        Err(e) => {
            error!("Built-in matcher '{}' failed to compile and is disabled: {}", spec.name, e);
            None
        }
    }
}

static COMPILED_CATALOG: Lazy<Vec<(DetectionCategory, Vec<CategoryMatcher>)>> = Lazy::new(|| {
    DetectionCategory::ALL
        .iter()
        .map(|&category| {
            let matchers: Vec<CategoryMatcher> = specs_for(category).iter().filter_map(compile_spec).collect();
            debug!("Compiled {} matcher(s) for category '{}'.", matchers.len(), category);
            (category, matchers)
        })
        .collect()
});

/// Read-only view over the compiled category table.
///
/// Cloning is free; all instances share the same compiled matchers.
#[derive(Debug, Clone, Copy)]
pub struct PatternCatalog {
    address_enabled: bool,
}

impl PatternCatalog {
    pub fn new(address_enabled: bool) -> Self {
        Self { address_enabled }
    }

    /// Categories that take part in a scan, in scan order.
    pub fn categories(&self) -> Vec<DetectionCategory> {
        DetectionCategory::ALL
            .iter()
            .copied()
            .filter(|c| self.is_enabled(*c))
            .collect()
    }

    pub fn is_enabled(&self, category: DetectionCategory) -> bool {
        !category.is_advisory() || self.address_enabled
    }

    /// Compiled matchers for a category, regardless of whether it is enabled.
    pub fn rules_for(&self, category: DetectionCategory) -> &'static [CategoryMatcher] {
        COMPILED_CATALOG
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, matchers)| matchers.as_slice())
            .unwrap_or(&[])
    }
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(category: DetectionCategory, text: &str) -> Vec<String> {
        PatternCatalog::new(true)
            .rules_for(category)
            .iter()
            .flat_map(|m| m.find_spans(text))
            .map(|(s, e)| text[s..e].to_string())
            .collect()
    }

    #[test]
    fn test_every_builtin_matcher_compiles() {
        for category in DetectionCategory::ALL {
            assert_eq!(
                PatternCatalog::default().rules_for(category).len(),
                specs_for(category).len(),
                "a matcher for {} failed to compile",
                category
            );
        }
    }

    #[test]
    fn test_address_is_advisory() {
        assert!(!PatternCatalog::default().categories().contains(&DetectionCategory::Address));
        assert!(PatternCatalog::new(true).categories().contains(&DetectionCategory::Address));
        assert_eq!(PatternCatalog::default().categories().len(), 5);
    }

    #[test]
    fn test_ssn_does_not_fire_on_card_number() {
        assert!(hits(DetectionCategory::SocialSecurityNumber, "card 4111 1111 1111 1111").is_empty());
        assert!(hits(DetectionCategory::SocialSecurityNumber, "card 4111-1111-1111-1111").is_empty());
        assert_eq!(hits(DetectionCategory::SocialSecurityNumber, "ssn 123-45-6789"), vec!["123-45-6789"]);
    }

    #[test]
    fn test_numeric_matchers_ignore_platform_identifiers() {
        let text = "see <@!123456789012345678> and 1234567890123456789";
        for category in [
            DetectionCategory::Phone,
            DetectionCategory::SocialSecurityNumber,
            DetectionCategory::CreditCard,
        ] {
            assert!(hits(category, text).is_empty(), "{} fired on an identifier", category);
        }
    }

    #[test]
    fn test_phone_layouts() {
        assert_eq!(hits(DetectionCategory::Phone, "call (555) 123-4567 now"), vec!["(555) 123-4567"]);
        assert_eq!(hits(DetectionCategory::Phone, "call 555.123.4567"), vec!["555.123.4567"]);
        assert!(!hits(DetectionCategory::Phone, "text +44 20 7946 0958").is_empty());
        assert!(hits(DetectionCategory::Phone, "placeholder 000-000-0000").is_empty());
    }

    #[test]
    fn test_credit_card_requires_luhn() {
        assert_eq!(hits(DetectionCategory::CreditCard, "4242 4242 4242 4242"), vec!["4242 4242 4242 4242"]);
        assert!(hits(DetectionCategory::CreditCard, "1234 5678 9012 3456").is_empty());
        assert_eq!(hits(DetectionCategory::CreditCard, "amex 3782 822463 10005"), vec!["3782 822463 10005"]);
    }

    #[test]
    fn test_full_name_reports_only_the_name() {
        assert_eq!(hits(DetectionCategory::FullName, "hi, my name is John Smith."), vec!["John Smith"]);
        assert!(hits(DetectionCategory::FullName, "John Smith said hi").is_empty());
    }

    #[test]
    fn test_category_keys_round_trip() {
        for category in DetectionCategory::ALL {
            assert_eq!(category.as_str().parse::<DetectionCategory>().unwrap(), category);
        }
        assert_eq!("credit_card".parse::<DetectionCategory>().unwrap(), DetectionCategory::CreditCard);
        assert!(matches!("discordIds".parse::<DetectionCategory>(), Err(GuardError::UnknownCategory(_))));
    }
}
