use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use memgov_audit::{AuditError, AuditIssue};
use memgov_fsio::FsioError;
use memgov_types::TypeError;

/// Errors from status store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No bucket holds an item with this id.
    #[error("memory item not found: {0}")]
    NotFound(String),

    /// A caller-supplied argument is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The two items are not an unresolved (active/pending) conflict.
    #[error("{pair_id} is not an unresolved conflict")]
    NotConflicting { pair_id: String },

    /// The post-mutation audit was severe; the store was rolled back.
    #[error("commit rejected by audit ({} severe issue(s)): {}", issues.len(), summarize(issues))]
    AuditRejected { issues: Vec<AuditIssue> },

    /// A stored file is not a readable list of records.
    #[error("{path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: AuditError,
    },

    /// Another caller held the store lock for longer than the timeout.
    #[error("timed out after {waited:?} waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    /// The lock could not be acquired for a reason other than contention.
    #[error("failed to acquire lock {path}: {source}")]
    LockAcquisition {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Restoring the pre-operation snapshot failed after `original`.
    #[error("rollback failed after error ({original}): {restore}")]
    RollbackFailed { original: String, restore: String },

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization of items failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem primitive failure (atomic write, etc.).
    #[error("filesystem error: {0}")]
    Fsio(FsioError),

    /// I/O error outside of the cases above.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<FsioError> for StoreError {
    fn from(err: FsioError) -> Self {
        match err {
            FsioError::LockTimeout { path, waited } => Self::LockTimeout { path, waited },
            FsioError::LockAcquisition { path, source } => Self::LockAcquisition { path, source },
            FsioError::Io(e) => Self::Io(e),
            other => Self::Fsio(other),
        }
    }
}

impl From<TypeError> for StoreError {
    fn from(err: TypeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<serde_yaml::Error> for StoreError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

fn summarize(issues: &[AuditIssue]) -> String {
    const SHOWN: usize = 3;
    let mut parts: Vec<String> = issues.iter().take(SHOWN).map(|i| i.to_string()).collect();
    if issues.len() > SHOWN {
        parts.push(format!("and {} more", issues.len() - SHOWN));
    }
    parts.join("; ")
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use memgov_audit::IssueCode;

    #[test]
    fn audit_rejection_summarizes_issues() {
        let issues: Vec<AuditIssue> = (1..=5)
            .map(|n| {
                AuditIssue::new(
                    IssueCode::DuplicateId,
                    Some(format!("MEM-2024-01-00{n}")),
                    "id occurs 2 times",
                )
            })
            .collect();
        let msg = StoreError::AuditRejected { issues }.to_string();
        assert!(msg.starts_with("commit rejected by audit (5 severe issue(s))"));
        assert!(msg.contains("MEM-2024-01-003"));
        assert!(!msg.contains("MEM-2024-01-004"));
        assert!(msg.ends_with("and 2 more"));
    }

    #[test]
    fn lock_errors_keep_their_kind() {
        let err: StoreError = FsioError::LockTimeout {
            path: "locks/status-store.lock".into(),
            waited: Duration::from_secs(30),
        }
        .into();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
    }

    #[test]
    fn type_errors_are_invalid_arguments() {
        let err: StoreError = TypeError::UnknownStatus("archived".into()).into();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }
}
