use std::path::{Path, PathBuf};

use serde::Serialize;

use memgov_types::Status;

/// On-disk layout of a store.
///
/// ```text
/// <memory_root>/MEMORY.yml               canonical merged item list
/// <memory_root>/status/<status>.yml      one bucket per status
/// <memory_root>/locks/<name>.lock        advisory lock files
/// <workspace_root>/MEMORY.md             runtime projection
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemoryPaths {
    pub memory_root: PathBuf,
    pub workspace_root: PathBuf,
    pub canonical: PathBuf,
    pub status_dir: PathBuf,
    pub locks_dir: PathBuf,
    pub runtime_projection: PathBuf,
}

impl MemoryPaths {
    pub fn new(memory_root: &Path, workspace_root: &Path) -> Self {
        Self {
            memory_root: memory_root.to_path_buf(),
            workspace_root: workspace_root.to_path_buf(),
            canonical: memory_root.join("MEMORY.yml"),
            status_dir: memory_root.join("status"),
            locks_dir: memory_root.join("locks"),
            runtime_projection: workspace_root.join("MEMORY.md"),
        }
    }

    /// Bucket file for a status.
    pub fn bucket(&self, status: Status) -> PathBuf {
        self.status_dir.join(format!("{}.yml", status.as_str()))
    }

    /// Lock file for a named resource.
    pub fn lock(&self, name: &str) -> PathBuf {
        self.locks_dir.join(format!("{name}.lock"))
    }

    /// Every file a commit may write: the buckets, the canonical file, and
    /// the runtime projection.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Status::ALL.iter().map(|s| self.bucket(*s)).collect();
        paths.push(self.canonical.clone());
        paths.push(self.runtime_projection.clone());
        paths
    }
}
