use thiserror::Error;

/// Errors produced by type parsing and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid item id {id:?}: {reason}")]
    InvalidItemId { id: String, reason: String },

    #[error("unknown status {0:?} (expected active, pending, or deprecated)")]
    UnknownStatus(String),

    #[error("unknown env {0:?} (expected all, prod, staging, or dev)")]
    UnknownEnv(String),

    #[error("unknown confidence {0:?} (expected high, medium, or low)")]
    UnknownConfidence(String),
}
