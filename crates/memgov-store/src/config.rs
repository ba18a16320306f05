use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use memgov_audit::AuditConfig;
use memgov_fsio::LockConfig;

use crate::error::{StoreError, StoreResult};

/// Store configuration, usually read from a TOML file.
///
/// Every key is optional; missing keys take their defaults.
///
/// ```toml
/// memory_root = "memory"
/// workspace_root = "."
///
/// [lock]
/// timeout_ms = 30000
/// poll_interval_ms = 200
/// stale_after_secs = 900
///
/// [audit]
/// allowed_source_prefixes = ["session:", "doc:"]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `MEMORY.yml`, `status/`, and `locks/`.
    pub memory_root: PathBuf,
    /// Directory receiving the runtime projection (`MEMORY.md`).
    pub workspace_root: PathBuf,
    pub lock: LockSettings,
    pub audit: AuditConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            memory_root: PathBuf::from("memory"),
            workspace_root: PathBuf::from("."),
            lock: LockSettings::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Default configuration rooted at the given directories.
    pub fn with_roots(memory_root: impl Into<PathBuf>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            memory_root: memory_root.into(),
            workspace_root: workspace_root.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML configuration document.
    pub fn from_toml_str(raw: &str) -> StoreResult<Self> {
        toml::from_str(raw).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Read a TOML configuration file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Lock parameters for the file lock manager.
    pub fn lock_config(&self) -> LockConfig {
        self.lock.to_lock_config()
    }
}

/// Lock timing, in TOML-friendly units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub stale_after_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        let defaults = LockConfig::default();
        Self {
            timeout_ms: defaults.timeout.as_millis() as u64,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            stale_after_secs: defaults.stale_after.as_secs(),
        }
    }
}

impl LockSettings {
    pub fn to_lock_config(&self) -> LockConfig {
        LockConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            stale_after: Duration::from_secs(self.stale_after_secs),
        }
    }
}
