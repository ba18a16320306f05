//! Transactional status store for memgov.
//!
//! Items live in three bucket files under `<memory_root>/status/`, one per
//! status. From the buckets the store derives the canonical `MEMORY.yml`
//! and the runtime projection `MEMORY.md`. Every mutation holds the
//! `status-store` file lock, passes the audit gate, and either persists all
//! artifacts or restores them byte-for-byte.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use chrono::Local;
//! use memgov_store::{StatusStore, StoreConfig};
//! use memgov_types::Status;
//!
//! let store = StatusStore::new(&StoreConfig::with_roots("memory", "."));
//! store.init()?;
//! let change = store.change_status("MEM-2024-01-001", Status::Active, Local::now().date_naive())?;
//! println!("{} -> {} ({})", change.from, change.to, change.counts);
//! # Ok::<(), memgov_store::StoreError>(())
//! ```

pub mod buckets;
pub mod config;
pub mod error;
pub mod paths;
pub mod projection;
pub mod snapshot;
pub mod store;

pub use buckets::{InvalidRecord, StatusBuckets};
pub use config::{LockSettings, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use paths::MemoryPaths;
pub use projection::{MarkdownProjection, ProjectionRenderer};
pub use snapshot::FileSnapshot;
pub use store::{
    EnsureOutcome, InitReport, MergeOutcome, MergeRequest, StatusChange, StatusStore, STORE_LOCK,
};
