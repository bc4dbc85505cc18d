//! File Lock (spec.md §4.B) — cross-process mutual exclusion via atomic
//! directory creation, with bounded retry and jittered backoff.
//!
//! No stale-lock reclamation is implemented in the core: a process that
//! crashes while holding the lock leaves it held until an operator
//! manually removes the directory. This is a documented risk, not a bug.

use crate::error::{ErrorCode, GateError};
use rand::Rng;
use std::path::Path;
use std::time::Duration;

const TOOL: &str = "file_lock";

/// Acquire the directory-lock at `path`, retrying on `EEXIST` up to
/// `max_retries` times with `retry_interval_ms + uniform_jitter(0, 20)`
/// sleeps between attempts.
pub fn acquire(path: &Path, retry_interval_ms: u64, max_retries: u32) -> crate::error::Result<()> {
    let mut attempt = 0u32;
    loop {
        match std::fs::create_dir(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                attempt += 1;
                if attempt > max_retries {
                    return Err(GateError::new(
                        ErrorCode::AuditLockFailed,
                        TOOL,
                        format!(
                            "lock acquisition failed after {} retries: {}",
                            max_retries,
                            path.display()
                        ),
                    ));
                }
                let jitter = rand::thread_rng().gen_range(0..=20);
                std::thread::sleep(Duration::from_millis(retry_interval_ms + jitter));
            }
            Err(e) => {
                return Err(GateError::from_unknown(
                    e,
                    TOOL,
                    format!("failed to create lock directory: {}", path.display()),
                ))
            }
        }
    }
}

/// Release the lock. Idempotent: a missing directory (`ENOENT`) is not an
/// error — the lock is already released.
pub fn release(path: &Path) -> crate::error::Result<()> {
    match std::fs::remove_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GateError::from_unknown(
            e,
            TOOL,
            format!("failed to release lock directory: {}", path.display()),
        )),
    }
}

/// RAII guard: acquires on construction, releases on drop (all exit paths,
/// including panics unwinding through the guard).
pub struct LockGuard<'a> {
    path: &'a Path,
}

impl<'a> LockGuard<'a> {
    pub fn acquire(path: &'a Path, retry_interval_ms: u64, max_retries: u32) -> crate::error::Result<Self> {
        acquire(path, retry_interval_ms, max_retries)?;
        Ok(Self { path })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = release(self.path) {
            tracing::error!(error = %e, path = %self.path.display(), "failed to release file lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_then_release_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("audit.lock");
        acquire(&lock_path, 5, 3).unwrap();
        assert!(lock_path.is_dir());
        release(&lock_path).unwrap();
        assert!(!lock_path.exists());
    }

    #[test]
    fn release_is_idempotent_on_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("never-created");
        release(&lock_path).unwrap();
    }

    #[test]
    fn acquire_fails_with_bounded_retries_when_contended() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("audit.lock");
        std::fs::create_dir(&lock_path).unwrap();
        let err = acquire(&lock_path, 1, 1).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::AuditLockFailed);
    }

    #[test]
    fn lock_guard_releases_on_drop() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("audit.lock");
        {
            let _guard = LockGuard::acquire(&lock_path, 5, 3).unwrap();
            assert!(lock_path.is_dir());
        }
        assert!(!lock_path.exists());
    }
}
