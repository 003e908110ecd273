// doxguard-core/src/lib.rs
//! # doxguard Core Library
//!
//! `doxguard-core` finds personal information in chat text, governs the exclusion
//! rules that suppress false positives, and turns repeated detections into an
//! escalating response tier. It does no network I/O; persistence goes through the
//! small [`DocumentBackend`] trait.
//!
//! ## Modules
//!
//! * `catalog`: The static table of detection categories, matchers and risk weights.
//! * `validators`: Programmatic checks (SSA rules, Luhn) run on regex candidates.
//! * `detection_match`: Match and scan-result types, censoring, and PII-safe debug logging.
//! * `risk`: Weighted scoring and risk levels.
//! * `exceptions`: The layered exclusion store and its system-protected global rule.
//! * `guardian`: Validation, repair and maintenance of the protected rule.
//! * `engine` / `engines`: The `DetectionEngine` trait, the regex implementation and the
//!   regex-free identifier fast path.
//! * `ledger`: Append-only detection history.
//! * `escalation`: The escalation table and the sanction-count seam.
//! * `guard`: A facade wiring everything together.
//! * `scheduler`: Periodic maintenance on a tokio runtime.
//! * `storage`: Document backends and the retrying writer.
//! * `config`: YAML settings with embedded defaults.
//!
//! ## Usage Example
//!
//! ```rust
//! use std::sync::Arc;
//! use doxguard_core::{Guard, GuardConfig, MemoryBackend, NoSanctions};
//!
//! fn main() -> anyhow::Result<()> {
//!     let guard = Guard::open(Arc::new(MemoryBackend::new()), GuardConfig::load_default()?);
//!
//!     // Platform identifiers are never personal information.
//!     assert!(!guard.scan("ping <@123456789012345678>", "guild-1").detected);
//!
//!     let outcome = guard.process("user-7", "guild-1", "card 4111 1111 1111 1111", &NoSanctions)?;
//!     assert_eq!(outcome.scan.matches[0].censored, "**** **** **** 1111");
//!     println!("tier: {}", outcome.decision.unwrap().tier);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Core operations return [`GuardError`]. Corrupt persisted documents are recovered
//! locally and never surface as errors; invalid caller input always does. Configuration
//! loading uses `anyhow`.
//!
//! ---
//! License: MIT OR APACHE 2.0

pub mod catalog;
pub mod config;
pub mod detection_match;
pub mod engine;
pub mod engines;
pub mod errors;
pub mod escalation;
pub mod exceptions;
pub mod guard;
pub mod guardian;
pub mod ledger;
pub mod risk;
pub mod scheduler;
pub mod storage;
pub mod validators;

/// Re-exports the settings types.
pub use config::{
    DetectionConfig, EscalationConfig, ExceptionConfig, GuardConfig, PersistenceConfig, RiskThresholds,
};

/// Re-exports the custom error type for clear error reporting.
pub use errors::GuardError;

pub use catalog::{CategoryMatcher, DetectionCategory, PatternCatalog};
pub use detection_match::{canonical_sample_hash, censor, redact_sensitive, DetectionMatch, ScanResult};
pub use risk::{weighted_score, RiskLevel};

/// Re-exports the detection engine trait and its implementations.
pub use engine::DetectionEngine;
pub use engines::fast_path::{contains_platform_identifier, is_platform_identifier};
pub use engines::regex_engine::RegexEngine;

pub use exceptions::{
    AuxiliaryKind, AuxiliaryPattern, CategoryKey, ChangeReport, ExceptionDocument, ExceptionStore,
    ExclusionRule, HistoryAction, HistoryEntry, MaintenanceEntry, ProtectedRule, RuleKind,
    ANY_CATEGORY, CANONICAL_PATTERN, GLOBAL_SCOPE, PROTECTED_CATEGORY, PROTECTED_RULE_VERSION, SYSTEM_ACTOR,
};
pub use guardian::{
    ConfigurationGuardian, IssueKind, MaintenanceReport, RepairReport, ValidationIssue, ValidationReport,
};

pub use escalation::{
    EscalationDecision, EscalationPolicy, EscalationTier, FixedSanctions, NoSanctions, SanctionCountProvider,
};
pub use ledger::{DetectionLedger, DetectionRecord};

pub use guard::{Guard, ProcessOutcome};
pub use scheduler::MaintenanceScheduler;
pub use storage::{write_with_retry, DocumentBackend, FileBackend, MemoryBackend};
