use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use chrono::NaiveDate;
use serde_yaml::Value;
use tracing::debug;

use memgov_types::{MemoryItem, Status};

use crate::config::AuditConfig;
use crate::conflict::{ConflictMode, ConflictScanner, PairwiseScanner};
use crate::error::{AuditError, Result};
use crate::parse::{parse_document, parse_record, RecordErrors};
use crate::report::{AuditIssue, AuditReport, IssueCode};

/// Validates item records and computes the global invariant verdict.
///
/// The verdict of [`AuditEngine::audit`] is the commit gate for every store
/// mutation: a severe verdict means the candidate state must not persist.
pub struct AuditEngine {
    config: AuditConfig,
    scanner: Box<dyn ConflictScanner>,
}

impl AuditEngine {
    /// Create an engine with the pairwise conflict scanner.
    pub fn new(config: AuditConfig) -> Self {
        Self::with_scanner(config, Box::new(PairwiseScanner))
    }

    /// Create an engine with a custom conflict scanner.
    pub fn with_scanner(config: AuditConfig, scanner: Box<dyn ConflictScanner>) -> Self {
        Self { config, scanner }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn scanner(&self) -> &dyn ConflictScanner {
        self.scanner.as_ref()
    }

    /// Validate every record independently.
    ///
    /// Returns the records that parsed cleanly, and one `schema` issue per
    /// field error of the records that did not.
    pub fn parse_records(&self, records: &[Value]) -> (Vec<MemoryItem>, Vec<AuditIssue>) {
        let mut items = Vec::with_capacity(records.len());
        let mut issues = Vec::new();
        for (index, record) in records.iter().enumerate() {
            match parse_record(index, record) {
                Ok(item) => items.push(item),
                Err(RecordErrors { index, id, errors }) => {
                    issues.extend(errors.into_iter().map(|message| {
                        AuditIssue::new(IssueCode::Schema, id.clone(), message).at_record(index)
                    }));
                }
            }
        }
        (items, issues)
    }

    /// Parse `records` and run every global check against `today`.
    pub fn audit(&self, records: &[Value], today: NaiveDate) -> AuditReport {
        let (items, mut issues) = self.parse_records(records);
        issues.extend(self.global_issues(&items, today));
        let report = AuditReport::new(items, issues);
        debug!(
            items = report.item_count,
            issues = report.issues.len(),
            verdict = %report.verdict,
            "audit complete"
        );
        report
    }

    /// Audit a YAML document. A document that is not a list of records is
    /// itself a `schema` issue.
    pub fn audit_document(&self, yaml: &str, today: NaiveDate) -> AuditReport {
        match parse_document(yaml) {
            Ok(records) => self.audit(&records, today),
            Err(e) => AuditReport::new(
                Vec::new(),
                vec![AuditIssue::new(IssueCode::Schema, None, e.to_string())],
            ),
        }
    }

    /// Audit a YAML file. A missing file audits as an empty list.
    pub fn audit_file(&self, path: &Path, today: NaiveDate) -> Result<AuditReport> {
        let yaml = match fs::read_to_string(path) {
            Ok(yaml) => yaml,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(AuditError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(self.audit_document(&yaml, today))
    }

    /// Duplicate ids, provenance, staleness, and active conflicts, in that
    /// order; each group sorted by id.
    fn global_issues(&self, items: &[MemoryItem], today: NaiveDate) -> Vec<AuditIssue> {
        let mut issues = Vec::new();

        let mut occurrences: BTreeMap<&str, usize> = BTreeMap::new();
        for item in items {
            *occurrences.entry(item.id.as_str()).or_default() += 1;
        }
        for (id, count) in occurrences.into_iter().filter(|(_, n)| *n > 1) {
            issues.push(AuditIssue::new(
                IssueCode::DuplicateId,
                Some(id.to_string()),
                format!("id occurs {count} times"),
            ));
        }

        let mut sorted: Vec<&MemoryItem> = items.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        for item in &sorted {
            if !self.config.is_allowed_source(&item.source) {
                let message = if item.source.trim().is_empty() {
                    "missing provenance `source`".to_string()
                } else {
                    format!("source {:?} does not match an allowed prefix", item.source)
                };
                issues.push(AuditIssue::new(IssueCode::NoSource, Some(item.id.clone()), message));
            }
        }

        for item in &sorted {
            if item.status == Status::Active && item.is_expired(today) {
                issues.push(AuditIssue::new(
                    IssueCode::Stale,
                    Some(item.id.clone()),
                    format!("active item expired on {}", item.expires),
                ));
            }
        }

        for pair in self.scanner.scan(items, ConflictMode::ActiveOnly) {
            let message = format!(
                "{} and {} disagree on {}/{}",
                pair.left, pair.right, pair.topic, pair.key
            );
            issues.push(AuditIssue::new(IssueCode::Conflict, Some(pair.pair_id), message));
        }

        issues
    }
}

impl Default for AuditEngine {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Verdict;
    use memgov_types::{Env, Scope};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn today() -> NaiveDate {
        date("2024-04-01")
    }

    fn item(id: &str, value: &str, status: Status) -> MemoryItem {
        MemoryItem::new(
            id,
            "deploy",
            "mode",
            value,
            "session:2024-01-01",
            date("2024-01-01"),
            date("2024-06-01"),
        )
        .with_status(status)
    }

    fn to_records(items: &[MemoryItem]) -> Vec<Value> {
        let yaml = serde_yaml::to_string(items).unwrap();
        parse_document(&yaml).unwrap()
    }

    #[test]
    fn clean_store_has_clean_verdict() {
        let items = vec![
            item("MEM-2024-01-001", "canary", Status::Active),
            item("MEM-2024-01-002", "blue-green", Status::Pending),
        ];
        let report = AuditEngine::default().audit(&to_records(&items), today());
        assert_eq!(report.verdict, Verdict::Clean);
        assert_eq!(report.item_count, 2);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn bad_record_does_not_block_others() {
        let mut records = to_records(&[item("MEM-2024-01-001", "canary", Status::Active)]);
        records.push(Value::String("garbage".into()));
        records.extend(to_records(&[item("MEM-2024-01-002", "canary", Status::Pending)]));

        let report = AuditEngine::default().audit(&records, today());
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.count(IssueCode::Schema), 1);
        assert_eq!(report.issues[0].record, Some(1));
        assert_eq!(report.verdict, Verdict::Severe);
    }

    #[test]
    fn duplicate_ids_are_severe() {
        let items = vec![
            item("MEM-2024-01-001", "canary", Status::Active),
            item("MEM-2024-01-001", "canary", Status::Deprecated),
        ];
        let report = AuditEngine::default().audit(&to_records(&items), today());
        assert_eq!(report.count(IssueCode::DuplicateId), 1);
        assert_eq!(report.issues[0].id.as_deref(), Some("MEM-2024-01-001"));
        assert!(report.is_severe());
    }

    #[test]
    fn missing_or_unknown_source_is_severe() {
        let mut missing = item("MEM-2024-01-001", "canary", Status::Pending);
        missing.source = String::new();
        let mut unknown = item("MEM-2024-01-002", "canary", Status::Pending);
        unknown.source = "rumor:hallway".into();

        let report = AuditEngine::default().audit(&to_records(&[unknown, missing]), today());
        assert_eq!(report.count(IssueCode::NoSource), 2);
        assert!(report.issues[0].message.contains("missing"));
        assert!(report.issues[1].message.contains("allowed prefix"));
        assert!(report.is_severe());
    }

    #[test]
    fn stale_active_items_are_stale_only() {
        let mut expired = item("MEM-2024-01-001", "canary", Status::Active);
        expired.expires = date("2024-03-31");
        let mut expired_pending = item("MEM-2024-01-002", "canary", Status::Pending);
        expired_pending.expires = date("2024-03-31");
        let mut ends_today = item("MEM-2024-01-003", "canary", Status::Active);
        ends_today.key = "other".into();
        ends_today.expires = today();

        let report = AuditEngine::default()
            .audit(&to_records(&[expired, expired_pending, ends_today]), today());
        assert_eq!(report.count(IssueCode::Stale), 1);
        assert_eq!(report.verdict, Verdict::StaleOnly);
    }

    #[test]
    fn only_active_conflicts_are_audited() {
        let a = item("MEM-2024-01-001", "canary", Status::Active);
        let b = item("MEM-2024-01-002", "blue-green", Status::Pending)
            .with_scope(Scope::env(Env::Prod));
        let report = AuditEngine::default().audit(&to_records(&[a.clone(), b.clone()]), today());
        assert_eq!(report.verdict, Verdict::Clean);

        let b = b.with_status(Status::Active);
        let report = AuditEngine::default().audit(&to_records(&[a, b]), today());
        assert_eq!(report.count(IssueCode::Conflict), 1);
        assert_eq!(
            report.issues[0].id.as_deref(),
            Some("MEM-2024-01-001::MEM-2024-01-002")
        );
        assert!(report.is_severe());
    }

    #[test]
    fn non_list_document_is_schema_issue() {
        let report = AuditEngine::default().audit_document("id: MEM-2024-01-001\n", today());
        assert_eq!(report.count(IssueCode::Schema), 1);
        assert!(report.is_severe());
    }

    #[test]
    fn audit_missing_file_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let report = AuditEngine::default()
            .audit_file(&dir.path().join("MEMORY.yml"), today())
            .unwrap();
        assert_eq!(report.verdict, Verdict::Clean);
        assert_eq!(report.item_count, 0);
    }

    #[test]
    fn custom_scanner_is_used() {
        struct NeverConflicts;
        impl ConflictScanner for NeverConflicts {
            fn scan(&self, _: &[MemoryItem], _: ConflictMode) -> Vec<crate::ConflictPair> {
                Vec::new()
            }
        }

        let engine = AuditEngine::with_scanner(AuditConfig::default(), Box::new(NeverConflicts));
        let report = engine.audit(
            &to_records(&[
                item("MEM-2024-01-001", "canary", Status::Active),
                item("MEM-2024-01-002", "rolling", Status::Active),
            ]),
            today(),
        );
        assert_eq!(report.verdict, Verdict::Clean);
    }
}
