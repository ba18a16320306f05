//! Advisory cross-process lock files.
//!
//! A lock is a file created with `create_new`, so exactly one caller wins
//! the race to create it. Losers poll until the holder deletes the file,
//! the file turns stale (its mtime is older than `stale_after`, meaning the
//! holder most likely crashed), or the timeout elapses.
//!
//! The lock only protects cooperating callers that go through this module.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FsioError, Result};

/// Lock acquisition parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockConfig {
    /// Give up after waiting this long (default: 30 s).
    pub timeout: Duration,
    /// Sleep between attempts (default: 200 ms).
    pub poll_interval: Duration,
    /// A lock file older than this is reclaimed (default: 15 min).
    pub stale_after: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(200),
            stale_after: Duration::from_secs(15 * 60),
        }
    }
}

/// Contents of a lock file: who holds it and since when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPayload {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockPayload {
    fn current() -> Self {
        Self {
            pid: process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// A held lock. The lock file is deleted when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    payload: LockPayload,
    released: bool,
}

impl LockGuard {
    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Payload written when the lock was acquired.
    pub fn payload(&self) -> &LockPayload {
        &self.payload
    }

    /// Release the lock now instead of at drop time.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        // Someone may have reclaimed our lock as stale; leave theirs alone.
        match read_holder(&self.path) {
            Ok(Some(holder)) if holder != self.payload => {
                warn!(
                    path = %self.path.display(),
                    holder_pid = holder.pid,
                    "lock was reclaimed by another holder; not removing"
                );
                return Ok(());
            }
            Ok(None) => return Ok(()),
            _ => {}
        }

        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "lock released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

/// Acquire the lock at `path`, blocking up to `config.timeout`.
pub fn acquire(path: &Path, config: &LockConfig) -> Result<LockGuard> {
    let acquisition = |source: io::Error| FsioError::LockAcquisition {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(acquisition)?;
    }

    let start = Instant::now();
    loop {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let payload = LockPayload::current();
                let body = serde_json::to_vec(&payload)
                    .map_err(|e| FsioError::Serialization(e.to_string()))?;
                if let Err(e) = file.write_all(&body).and_then(|()| file.sync_all()) {
                    let _ = fs::remove_file(path);
                    return Err(acquisition(e));
                }
                debug!(
                    path = %path.display(),
                    waited_ms = start.elapsed().as_millis() as u64,
                    "lock acquired"
                );
                return Ok(LockGuard {
                    path: path.to_path_buf(),
                    payload,
                    released: false,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                match lock_age(path).map_err(acquisition)? {
                    // Holder released between our attempt and the age check.
                    None => continue,
                    Some(age) if age > config.stale_after => {
                        if reclaim_stale(path, config).map_err(acquisition)? {
                            continue;
                        }
                    }
                    Some(_) => {}
                }

                let waited = start.elapsed();
                if waited >= config.timeout {
                    return Err(FsioError::LockTimeout {
                        path: path.to_path_buf(),
                        waited,
                    });
                }
                thread::sleep(config.poll_interval.min(config.timeout - waited));
            }
            Err(e) => return Err(acquisition(e)),
        }
    }
}

/// Run `task` while holding the lock at `path`.
///
/// The lock is released on every exit path, including when `task` fails or
/// panics.
pub fn with_lock<T, E, F>(path: &Path, config: &LockConfig, task: F) -> std::result::Result<T, E>
where
    F: FnOnce() -> std::result::Result<T, E>,
    E: From<FsioError>,
{
    let guard = acquire(path, config)?;
    let outcome = task();
    if let Err(e) = guard.release() {
        warn!(path = %path.display(), error = %e, "failed to release lock");
    }
    outcome
}

/// Read the current holder of a lock, if any.
///
/// A lock file with unparseable contents (e.g. a holder that crashed while
/// writing its payload) reads as `None`; its age alone decides reclaim.
pub fn read_holder(path: &Path) -> Result<Option<LockPayload>> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove the lock at `path` if it is still stale.
///
/// Reclaimers serialize on a sibling `<name>.reclaim` file and re-check the
/// lock's age while holding it, so a lock that another reclaimer has already
/// replaced with a fresh one is never deleted. Returns `true` when the stale
/// lock is gone and the caller should retry at once, `false` when it should
/// keep waiting.
fn reclaim_stale(path: &Path, config: &LockConfig) -> io::Result<bool> {
    let guard_path = reclaim_path(path);
    match OpenOptions::new().write(true).create_new(true).open(&guard_path) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            // Left behind by a reclaimer that died mid-reclaim.
            if lock_age(&guard_path)?.is_some_and(|age| age > config.stale_after) {
                warn!(path = %guard_path.display(), "removing abandoned reclaim guard");
                remove_missing_ok(&guard_path)?;
            }
            return Ok(false);
        }
        Err(e) => return Err(e),
    }

    let outcome = match lock_age(path) {
        Ok(None) => Ok(true),
        Ok(Some(age)) if age > config.stale_after => {
            warn!(
                path = %path.display(),
                age_secs = age.as_secs(),
                "reclaiming stale lock"
            );
            remove_missing_ok(path).map(|()| true)
        }
        Ok(Some(_)) => Ok(false),
        Err(e) => Err(e),
    };

    if let Err(e) = remove_missing_ok(&guard_path) {
        warn!(path = %guard_path.display(), error = %e, "failed to remove reclaim guard");
    }
    outcome
}

fn reclaim_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".reclaim");
    PathBuf::from(name)
}

fn remove_missing_ok(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Age of the lock file, or `None` if it no longer exists.
fn lock_age(path: &Path) -> io::Result<Option<Duration>> {
    let modified = match fs::metadata(path) {
        Ok(meta) => meta.modified()?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config() -> LockConfig {
        LockConfig {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            stale_after: Duration::from_secs(3600),
        }
    }

    fn backdate(path: &Path, by: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn acquire_writes_payload_and_release_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks/store.lock");

        let guard = acquire(&path, &fast_config()).unwrap();
        let holder = read_holder(&path).unwrap().unwrap();
        assert_eq!(holder.pid, process::id());
        assert_eq!(&holder, guard.payload());

        guard.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");
        {
            let _guard = acquire(&path, &fast_config()).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn with_lock_releases_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");

        let result: std::result::Result<(), FsioError> = with_lock(&path, &fast_config(), || {
            Err(FsioError::Serialization("task failed".into()))
        });

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn times_out_on_fresh_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");
        let _held = acquire(&path, &fast_config()).unwrap();

        let config = LockConfig {
            timeout: Duration::from_millis(150),
            ..fast_config()
        };
        let start = Instant::now();
        let err = acquire(&path, &config).unwrap_err();

        assert!(matches!(err, FsioError::LockTimeout { .. }), "got {err}");
        assert!(start.elapsed() >= Duration::from_millis(150));
        // The held lock is untouched.
        assert!(path.exists());
    }

    #[test]
    fn reclaims_stale_lock_without_waiting_for_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");
        fs::write(&path, br#"{"pid":1,"acquired_at":"2020-01-01T00:00:00Z"}"#).unwrap();
        backdate(&path, Duration::from_secs(20 * 60));

        let config = LockConfig {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(200),
            stale_after: Duration::from_secs(15 * 60),
        };
        let start = Instant::now();
        let guard = acquire(&path, &config).unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(guard.payload().pid, process::id());
    }

    #[test]
    fn stale_lock_reclaimed_by_one_waiter_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("store.lock"));
        fs::write(&*path, br#"{"pid":1,"acquired_at":"2020-01-01T00:00:00Z"}"#).unwrap();
        backdate(&path, Duration::from_secs(20 * 60));

        let config = LockConfig {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(1),
            stale_after: Duration::from_secs(15 * 60),
        };
        let inside = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let start = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = Arc::clone(&path);
                let inside = Arc::clone(&inside);
                let completed = Arc::clone(&completed);
                let start = Arc::clone(&start);
                let config = config.clone();
                thread::spawn(move || {
                    start.wait();
                    with_lock(&path, &config, || {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok::<(), FsioError>(())
                    })
                    .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(completed.load(Ordering::SeqCst), 8);
        assert!(!path.exists());
        assert!(!reclaim_path(&path).exists());
    }

    #[test]
    fn reclaim_leaves_fresh_lock_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");
        let held = acquire(&path, &fast_config()).unwrap();

        // A waiter that measured the old file's age before it was replaced.
        assert!(!reclaim_stale(&path, &fast_config()).unwrap());
        assert_eq!(read_holder(&path).unwrap().as_ref(), Some(held.payload()));
        assert!(!reclaim_path(&path).exists());
    }

    #[test]
    fn abandoned_reclaim_guard_does_not_block_forever() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");
        fs::write(&path, b"{}").unwrap();
        backdate(&path, Duration::from_secs(20 * 60));
        let guard_path = reclaim_path(&path);
        fs::write(&guard_path, b"").unwrap();
        backdate(&guard_path, Duration::from_secs(20 * 60));

        let config = LockConfig {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            stale_after: Duration::from_secs(15 * 60),
        };
        let guard = acquire(&path, &config).unwrap();
        assert_eq!(guard.payload().pid, process::id());
        assert!(!guard_path.exists());
    }

    #[test]
    fn release_skips_lock_reclaimed_by_someone_else() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");
        let guard = acquire(&path, &fast_config()).unwrap();

        let foreign = br#"{"pid":4242,"acquired_at":"2030-01-01T00:00:00Z"}"#;
        fs::write(&path, foreign).unwrap();
        guard.release().unwrap();

        assert_eq!(fs::read(&path).unwrap(), foreign);
    }

    #[test]
    fn garbage_payload_reads_as_no_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");
        fs::write(&path, b"not json").unwrap();
        assert_eq!(read_holder(&path).unwrap(), None);
    }

    #[test]
    fn critical_sections_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("store.lock"));
        let inside = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = Arc::clone(&path);
                let inside = Arc::clone(&inside);
                let completed = Arc::clone(&completed);
                thread::spawn(move || {
                    for _ in 0..5 {
                        with_lock(&path, &fast_config(), || {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            thread::sleep(Duration::from_millis(2));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            completed.fetch_add(1, Ordering::SeqCst);
                            Ok::<(), FsioError>(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(completed.load(Ordering::SeqCst), 20);
        assert!(!path.exists());
    }
}
