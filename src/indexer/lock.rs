//! Lease file that keeps two syncs from running against the same metadata.
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct Lease {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("another sync is running (pid {pid}, since {acquired_at})")]
    Held {
        pid: u32,
        acquired_at: DateTime<Utc>,
    },

    #[error("lock file error: {0}")]
    Io(#[from] io::Error),
}

/// Exclusive lease on a lock file, released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lease at `path`.
    ///
    /// A lease older than `stale_after`, or one whose contents cannot be
    /// read, is assumed to belong to a crashed run and is replaced.
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self, LockError> {
        match Self::create(path) {
            Ok(lock) => return Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(LockError::Io(e)),
        }

        let existing = fs::read_to_string(path)
            .ok()
            .and_then(|data| serde_json::from_str::<Lease>(&data).ok());

        if let Some(lease) = existing {
            let age = Utc::now() - lease.acquired_at;
            let fresh = age
                .to_std()
                .map(|age| age < stale_after)
                .unwrap_or(true);
            if fresh {
                return Err(LockError::Held {
                    pid: lease.pid,
                    acquired_at: lease.acquired_at,
                });
            }
            warn!(
                "Replacing stale sync lock held by pid {} since {}",
                lease.pid, lease.acquired_at
            );
        } else {
            warn!("Replacing unreadable sync lock {}", path.display());
        }

        fs::remove_file(path).map_err(LockError::Io)?;
        Self::create(path).map_err(LockError::Io)
    }

    fn create(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let lease = Lease {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let data = serde_json::to_vec(&lease).map_err(io::Error::other)?;
        file.write_all(&data)?;
        debug!("Acquired sync lock {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release sync lock {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.lock");

        let lock = RunLock::acquire(&path, HOUR).unwrap();
        assert!(path.exists());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.lock");

        let _held = RunLock::acquire(&path, HOUR).unwrap();
        match RunLock::acquire(&path, HOUR) {
            Err(LockError::Held { pid, .. }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected held lock, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_lease_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.lock");
        let old = Lease {
            pid: 1,
            acquired_at: Utc::now() - chrono::TimeDelta::hours(2),
        };
        fs::write(&path, serde_json::to_string(&old).unwrap()).unwrap();

        let lock = RunLock::acquire(&path, HOUR).unwrap();
        let lease: Lease = serde_json::from_str(&fs::read_to_string(lock.path()).unwrap()).unwrap();
        assert_eq!(lease.pid, std::process::id());
    }

    #[test]
    fn test_garbage_lease_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.lock");
        fs::write(&path, "garbage").unwrap();
        assert!(RunLock::acquire(&path, HOUR).is_ok());
    }
}
