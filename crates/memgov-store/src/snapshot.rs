//! Byte-level snapshots of store artifacts, used to undo a failed commit.

use std::path::PathBuf;

use tracing::debug;

use memgov_fsio::{read_optional, remove_if_exists, write_atomic};

use crate::error::StoreResult;

#[derive(Clone, Debug)]
struct Entry {
    path: PathBuf,
    /// `None` when the file did not exist at capture time.
    contents: Option<Vec<u8>>,
    digest: Option<blake3::Hash>,
}

/// The exact contents (or absence) of a set of files at one moment.
#[derive(Clone, Debug)]
pub struct FileSnapshot {
    entries: Vec<Entry>,
}

impl FileSnapshot {
    /// Read every path. Missing files are recorded as absent.
    pub fn capture(paths: &[PathBuf]) -> StoreResult<Self> {
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = read_optional(path)?;
            let digest = contents.as_deref().map(blake3::hash);
            let entry = Entry {
                path: path.clone(),
                contents,
                digest,
            };
            debug!(path = %entry.path.display(), digest = %entry.digest_hex(), "captured");
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    /// Put every file back exactly as captured: rewrite changed files,
    /// delete files that did not exist. Untouched files are left alone.
    ///
    /// Returns the number of files restored.
    pub fn restore(&self) -> StoreResult<usize> {
        let mut restored = 0;
        for entry in &self.entries {
            if entry.matches_disk()? {
                continue;
            }
            match &entry.contents {
                Some(bytes) => write_atomic(&entry.path, bytes)?,
                None => {
                    remove_if_exists(&entry.path)?;
                }
            }
            debug!(
                path = %entry.path.display(),
                digest = %entry.digest_hex(),
                "restored from snapshot"
            );
            restored += 1;
        }
        Ok(restored)
    }
}

impl Entry {
    fn digest_hex(&self) -> String {
        match &self.digest {
            Some(digest) => digest.to_hex().to_string(),
            None => "absent".to_string(),
        }
    }

    fn matches_disk(&self) -> StoreResult<bool> {
        let current = read_optional(&self.path)?;
        Ok(match (&self.digest, current) {
            (Some(digest), Some(bytes)) => *digest == blake3::hash(&bytes),
            (None, None) => true,
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn restore_rewrites_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("active.yml");
        let absent = dir.path().join("MEMORY.md");
        fs::write(&kept, "- original\n").unwrap();

        let snapshot = FileSnapshot::capture(&[kept.clone(), absent.clone()]).unwrap();
        assert_eq!(snapshot.restore().unwrap(), 0);

        fs::write(&kept, "- mutated\n").unwrap();
        fs::write(&absent, "# Memory\n").unwrap();

        assert_eq!(snapshot.restore().unwrap(), 2);
        assert_eq!(fs::read_to_string(&kept).unwrap(), "- original\n");
        assert!(!absent.exists());
        assert_eq!(snapshot.restore().unwrap(), 0);
    }

    #[test]
    fn identical_bytes_are_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("MEMORY.yml");
        fs::write(&path, "[]\n").unwrap();
        let snapshot = FileSnapshot::capture(&[path.clone()]).unwrap();

        fs::write(&path, "- changed\n").unwrap();
        fs::write(&path, "[]\n").unwrap();
        assert_eq!(snapshot.restore().unwrap(), 0);
    }
}
