//! Filesystem primitives for memgov.
//!
//! Two building blocks carry every durability and exclusion guarantee the
//! store makes:
//!
//! - [`write_atomic`]: temp-write + rename, so no reader ever observes a
//!   partially written file
//! - [`with_lock`] / [`acquire`]: advisory lock files with stale-lock
//!   reclaim and a bounded acquisition timeout
//!
//! # Design Rules
//!
//! 1. Every persisted artifact goes through [`write_atomic`].
//! 2. A lock is released on every exit path; a crash is the only way to
//!    leave one behind, and staleness reclaims it.
//! 3. Timeouts, poll intervals, and staleness thresholds are configuration
//!    ([`LockConfig`]), never constants at call sites.

pub mod atomic;
pub mod error;
pub mod lock;

pub use atomic::{read_optional, remove_if_exists, write_atomic};
pub use error::{FsioError, Result};
pub use lock::{acquire, read_holder, with_lock, LockConfig, LockGuard, LockPayload};
