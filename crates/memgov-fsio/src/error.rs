use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors produced by the filesystem primitives.
#[derive(Debug, thiserror::Error)]
pub enum FsioError {
    /// The lock was held by another caller for longer than the timeout.
    #[error("timed out after {waited:?} waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    /// Creating or reclaiming the lock file failed for a reason other than
    /// "already exists".
    #[error("failed to acquire lock {path}: {source}")]
    LockAcquisition {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing the temp file or renaming it into place failed.
    #[error("atomic write to {path} failed: {source}")]
    AtomicWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Serialization of a lock payload failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error outside of the cases above.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the fsio crate.
pub type Result<T> = std::result::Result<T, FsioError>;
