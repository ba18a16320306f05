//! Audit and validation gate for memgov.
//!
//! Every store mutation must pass through the audit before it can persist.
//! The audit parses raw records (a bad record yields issues, never an
//! error), then checks the global invariants over the whole item set and
//! reduces the findings to a [`Verdict`].
//!
//! # Checks
//!
//! | Code | Severity | Meaning |
//! |---|---|---|
//! | `schema` | severe | a record failed field validation |
//! | `duplicate-id` | severe | an id occurs more than once |
//! | `no-source` | severe | missing or non-allow-listed provenance |
//! | `conflict` | severe | two active items disagree about one slot |
//! | `stale` | stale-only | an active item's window has ended |
//!
//! # Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use memgov_audit::{AuditEngine, Verdict};
//!
//! let engine = AuditEngine::default();
//! let today = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
//! let report = engine.audit_document("[]\n", today);
//! assert_eq!(report.verdict, Verdict::Clean);
//! ```

pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod parse;
pub mod report;

pub use config::{AuditConfig, DEFAULT_SOURCE_PREFIXES};
pub use conflict::{
    conflicts, pair_id, scopes_intersect, windows_overlap, ConflictMode,
    ConflictPair, ConflictScanner, PairwiseScanner,
};
pub use engine::AuditEngine;
pub use error::{AuditError, Result};
pub use parse::{parse_document, parse_record, RecordErrors};
pub use report::{AuditIssue, AuditReport, IssueCode, Verdict};
