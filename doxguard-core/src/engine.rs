// doxguard-core/src/engine.rs
//! Defines the core DetectionEngine trait.
//!
//! The trait decouples callers (the `Guard` facade, the CLI) from the way text is
//! matched, so a different matching strategy can be dropped in without touching
//! the ledger or the escalation policy.
//!
//! License: MIT OR APACHE 2.0

use crate::catalog::PatternCatalog;
use crate::detection_match::ScanResult;

/// Finds personal information in text, honouring the exclusion rules of a scope.
pub trait DetectionEngine: Send + Sync {
    /// Scans `text` on behalf of `scope`.
    ///
    /// Empty or whitespace-only text yields [`ScanResult::empty`]. Scanning never fails:
    /// a rule that cannot be evaluated is skipped, not reported.
    fn scan(&self, text: &str, scope: &str) -> ScanResult;

    /// The catalog whose categories this engine applies.
    fn catalog(&self) -> &PatternCatalog;
}
