//! Risk scoring for a single scan.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::RiskThresholds;
use crate::detection_match::DetectionMatch;

/// Five-point ordinal summarising the severity of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(RiskLevel::None),
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

/// Σ(category weight × match count).
pub fn weighted_score(matches: &[DetectionMatch]) -> u32 {
    matches.iter().map(|m| m.category.risk_weight()).sum()
}

impl RiskThresholds {
    /// Maps a score to a level, checking the highest threshold first.
    pub fn level_for(&self, score: u32) -> RiskLevel {
        if score >= self.critical {
            RiskLevel::Critical
        } else if score >= self.high {
            RiskLevel::High
        } else if score >= self.medium {
            RiskLevel::Medium
        } else if score >= self.low {
            RiskLevel::Low
        } else {
            RiskLevel::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DetectionCategory;

    fn m(category: DetectionCategory) -> DetectionMatch {
        DetectionMatch::new(category, "x", 0, 1, '*')
    }

    #[test]
    fn test_threshold_boundaries() {
        let t = RiskThresholds::default();
        assert_eq!(t.level_for(0), RiskLevel::None);
        assert_eq!(t.level_for(1), RiskLevel::Low);
        assert_eq!(t.level_for(2), RiskLevel::Low);
        assert_eq!(t.level_for(3), RiskLevel::Medium);
        assert_eq!(t.level_for(5), RiskLevel::High);
        assert_eq!(t.level_for(7), RiskLevel::High);
        assert_eq!(t.level_for(8), RiskLevel::Critical);
        assert_eq!(t.level_for(100), RiskLevel::Critical);
    }

    #[test]
    fn test_weighted_score() {
        let matches = vec![
            m(DetectionCategory::Email),
            m(DetectionCategory::Email),
            m(DetectionCategory::SocialSecurityNumber),
        ];
        assert_eq!(weighted_score(&matches), 7);
    }

    #[test]
    fn test_adding_categories_never_lowers_risk() {
        let t = RiskThresholds::default();
        let mut matches = Vec::new();
        let mut previous = RiskLevel::None;
        for category in DetectionCategory::ALL {
            matches.push(m(category));
            let level = t.level_for(weighted_score(&matches));
            assert!(level >= previous);
            previous = level;
        }
        assert_eq!(previous, RiskLevel::Critical);
    }

    #[test]
    fn test_ordering() {
        assert!(RiskLevel::None < RiskLevel::Low);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!("HIGH".parse::<RiskLevel>().unwrap(), RiskLevel::High);
    }
}
