use std::fmt;

use serde::{Deserialize, Serialize};

use memgov_types::MemoryItem;

/// Classification of an audit finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCode {
    /// A record failed field validation.
    Schema,
    /// An id occurs more than once.
    DuplicateId,
    /// Missing or non-allow-listed provenance.
    NoSource,
    /// An active item whose validity window has ended.
    Stale,
    /// Two active items disagree about the same slot.
    Conflict,
}

impl IssueCode {
    /// Severe issues block every commit.
    pub fn is_severe(&self) -> bool {
        !matches!(self, Self::Stale)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::DuplicateId => "duplicate-id",
            Self::NoSource => "no-source",
            Self::Stale => "stale",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit finding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditIssue {
    pub code: IssueCode,
    /// Item id, or pair id for conflicts, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Zero-based position of the offending record in its document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<usize>,
    pub message: String,
}

impl AuditIssue {
    pub fn new(code: IssueCode, id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            id,
            record: None,
            message: message.into(),
        }
    }

    pub fn at_record(mut self, index: usize) -> Self {
        self.record = Some(index);
        self
    }
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.code)?;
        if let Some(id) = &self.id {
            write!(f, " {id}")?;
        } else if let Some(index) = self.record {
            write!(f, " record #{index}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Overall audit outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Clean,
    StaleOnly,
    Severe,
}

impl Verdict {
    /// Derive the verdict from a set of issues.
    pub fn from_issues(issues: &[AuditIssue]) -> Self {
        if issues.iter().any(|i| i.code.is_severe()) {
            Self::Severe
        } else if issues.is_empty() {
            Self::Clean
        } else {
            Self::StaleOnly
        }
    }

    /// Process exit code: 0 clean, 1 stale-only, 2 severe.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::StaleOnly => 1,
            Self::Severe => 2,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clean => "clean",
            Self::StaleOnly => "stale-only",
            Self::Severe => "severe",
        })
    }
}

/// Parsed items plus every issue found, with the resulting verdict.
#[derive(Clone, Debug, Serialize)]
pub struct AuditReport {
    pub verdict: Verdict,
    pub item_count: usize,
    pub issues: Vec<AuditIssue>,
    #[serde(skip)]
    pub items: Vec<MemoryItem>,
}

impl AuditReport {
    pub fn new(items: Vec<MemoryItem>, issues: Vec<AuditIssue>) -> Self {
        Self {
            verdict: Verdict::from_issues(&issues),
            item_count: items.len(),
            issues,
            items,
        }
    }

    pub fn is_severe(&self) -> bool {
        self.verdict == Verdict::Severe
    }

    /// Number of issues with the given code.
    pub fn count(&self, code: IssueCode) -> usize {
        self.issues.iter().filter(|i| i.code == code).count()
    }

    /// Issues that block a commit.
    pub fn severe_issues(&self) -> Vec<AuditIssue> {
        self.issues
            .iter()
            .filter(|i| i.code.is_severe())
            .cloned()
            .collect()
    }
}
