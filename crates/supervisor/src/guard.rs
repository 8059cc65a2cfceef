//! Cross-process launch lock.
//!
//! An advisory exclusive `flock` on a well-known file, held across the
//! check-then-act sequences that mutate the registry or the device state
//! (start, stop/abort, stale-state correction, reaper correction). Two
//! concurrent start requests can therefore never both pass the
//! "not running" check. `flock` locks belong to the open file
//! description, so separate opens within one process exclude each other
//! as well.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{Result, SupervisorError};

const MAX_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct LaunchLock {
    path: PathBuf,
    timeout: Duration,
}

/// Held lock. Released when dropped (closing the file drops the `flock`).
#[derive(Debug)]
pub struct LaunchGuard {
    _file: File,
}

impl LaunchLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, retrying with backoff until the timeout elapses.
    pub async fn acquire(&self) -> Result<LaunchGuard> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        let start = Instant::now();
        let mut backoff = Duration::from_millis(1);
        loop {
            if try_lock(&file)? {
                return Ok(LaunchGuard { _file: file });
            }
            if start.elapsed() >= self.timeout {
                return Err(SupervisorError::LockTimeout {
                    path: self.path.display().to_string(),
                });
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

fn try_lock(file: &File) -> std::io::Result<bool> {
    // SAFETY: the fd is valid for as long as `file` is borrowed.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => Ok(false),
        _ => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LaunchLock::new(dir.path().join("launch.lock"), Duration::from_millis(100));

        let held = lock.acquire().await.unwrap();
        let err = lock.acquire().await.unwrap_err();
        assert!(matches!(err, SupervisorError::LockTimeout { .. }));

        drop(held);
        assert!(lock.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_acquires_once_holder_releases() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LaunchLock::new(dir.path().join("launch.lock"), Duration::from_secs(2));

        let held = lock.acquire().await.unwrap();
        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
    }
}
