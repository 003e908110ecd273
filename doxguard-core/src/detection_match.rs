// doxguard-core/src/detection_match.rs
//! Provides core data structures and utility functions for detection matches,
//! censoring, and PII-safe debug logging within the `doxguard-core` library.

use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::catalog::DetectionCategory;
use crate::risk::RiskLevel;

use lazy_static::lazy_static;
use sha2::{Sha256, Digest};
use hex;

lazy_static! {
    /// A static boolean that is initialized once to determine if PII is allowed in debug logs.
    static ref PII_DEBUG_ALLOWED: bool = {
        std::env::var("DOXGUARD_ALLOW_DEBUG_PII")
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
}

/// A single surviving detection inside a scanned text.
///
/// `raw` is deliberately excluded from serialization; only the censored rendering
/// and the fingerprint ever leave the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionMatch {
    pub category: DetectionCategory,
    pub start: usize,
    pub end: usize,
    pub censored: String,
    pub fingerprint: String,
    #[serde(skip)]
    pub raw: String,
}

impl DetectionMatch {
    pub fn new(category: DetectionCategory, raw: &str, start: usize, end: usize, mask: char) -> Self {
        Self {
            category,
            start,
            end,
            censored: censor(category, raw, mask),
            fingerprint: canonical_sample_hash(category.as_str(), raw),
            raw: raw.to_string(),
        }
    }
}

/// Outcome of scanning one text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub detected: bool,
    pub matches: Vec<DetectionMatch>,
    pub risk_level: RiskLevel,
    pub score: u32,
}

impl ScanResult {
    /// The "nothing found" result, also returned for empty input.
    pub fn empty() -> Self {
        Self {
            detected: false,
            matches: Vec::new(),
            risk_level: RiskLevel::None,
            score: 0,
        }
    }

    /// Distinct categories among the surviving matches.
    pub fn categories(&self) -> BTreeSet<DetectionCategory> {
        self.matches.iter().map(|m| m.category).collect()
    }

    pub fn count_for(&self, category: DetectionCategory) -> usize {
        self.matches.iter().filter(|m| m.category == category).count()
    }

    /// Rebuilds the scanned `text` with every match replaced by its censored form.
    /// Where matches of different categories overlap, the earlier one wins.
    pub fn censored_text(&self, text: &str) -> String {
        let mut sorted: Vec<&DetectionMatch> = self.matches.iter().collect();
        sorted.sort_by_key(|m| m.start);

        let mut out = String::with_capacity(text.len());
        let mut last_end = 0usize;
        for m in sorted {
            if m.start < last_end || m.end > text.len() {
                continue;
            }
            out.push_str(&text[last_end..m.start]);
            out.push_str(&m.censored);
            last_end = m.end;
        }
        out.push_str(&text[last_end..]);
        out
    }
}

/// Produces the censored rendering of a raw match for its category.
pub fn censor(category: DetectionCategory, raw: &str, mask: char) -> String {
    match category {
        DetectionCategory::Phone | DetectionCategory::SocialSecurityNumber => {
            raw.chars().map(|c| if c.is_ascii_digit() { mask } else { c }).collect()
        }
        DetectionCategory::Email => censor_email(raw, mask),
        DetectionCategory::CreditCard => censor_card(raw, mask),
        DetectionCategory::FullName => {
            raw.chars().map(|c| if c.is_alphabetic() { mask } else { c }).collect()
        }
        DetectionCategory::Address => {
            raw.chars().map(|c| if c.is_alphanumeric() { mask } else { c }).collect()
        }
    }
}

fn censor_email(raw: &str, mask: char) -> String {
    let Some((local, domain)) = raw.split_once('@') else {
        return raw.chars().map(|_| mask).collect();
    };
    let mut chars = local.chars();
    let mut out = String::with_capacity(raw.len());
    if let Some(first) = chars.next() {
        out.push(first);
    }
    out.extend(chars.map(|_| mask));
    out.push('@');
    out.push_str(domain);
    out
}

fn censor_card(raw: &str, mask: char) -> String {
    let total_digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
    let keep_from = total_digits.saturating_sub(4);
    let mut seen = 0;
    raw.chars()
        .map(|c| {
            if c.is_ascii_digit() {
                seen += 1;
                if seen <= keep_from { mask } else { c }
            } else {
                c
            }
        })
        .collect()
}

pub fn redact_sensitive(s: &str) -> String {
    const MAX_LEN: usize = 8;
    if s.len() <= MAX_LEN {
        "[REDACTED]".to_string()
    } else {
        format!("[REDACTED: {} chars]", s.len())
    }
}

fn get_loggable_content(sensitive_content: &str) -> String {
    if *PII_DEBUG_ALLOWED {
        sensitive_content.to_string()
    } else {
        redact_sensitive(sensitive_content)
    }
}

pub fn log_detection_debug(
    module_path: &str,
    matcher_name: &str,
    original_sensitive_content: &str,
    censored_content: &str,
) {
    debug!("{} Found DetectionMatch: Matcher='{}', Original='{}', Censored='{}'",
        module_path,
        matcher_name,
        get_loggable_content(original_sensitive_content),
        censored_content
    );
}

pub fn log_suppressed_debug(
    module_path: &str,
    layer: &str,
    category: DetectionCategory,
    original_sensitive_content: &str,
) {
    debug!("{} Suppressed {} candidate via '{}': '{}'",
        module_path,
        category,
        layer,
        get_loggable_content(original_sensitive_content)
    );
}

pub fn canonical_sample_hash(rule_id: &str, snippet: &str) -> String {
    let normalized = snippet
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    hasher.update(b":");
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}
