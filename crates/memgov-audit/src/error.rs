use std::io;
use std::path::PathBuf;

/// Errors from reading item documents.
///
/// Problems with individual records are never errors; they are reported as
/// [`AuditIssue`](crate::AuditIssue)s so one bad record cannot block the rest.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The document is not valid YAML.
    #[error("invalid YAML: {0}")]
    Yaml(String),

    /// The document parsed, but its top level is not a list of records.
    #[error("expected a list of records, found {found}")]
    NotAList { found: &'static str },

    /// Reading the document from disk failed.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Convenience alias used throughout the audit crate.
pub type Result<T> = std::result::Result<T, AuditError>;
