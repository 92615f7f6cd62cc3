//! Advisory batch locks backed by marker files
//!
//! A named lock is held while `<lock_dir>/<key>.lock` exists. The marker is
//! created atomically and removed when the [`LockGuard`] is dropped, so every
//! exit path of a batch run releases it. A process that dies while holding a
//! lock leaves the marker behind; it must then be removed by hand.

use replicafs_common::{Error, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Lock key of the replication job
pub const REPLICATION_LOCK: &str = "replication";
/// Lock key of the erase job
pub const ERASE_LOCK: &str = "erase";

/// Creates and inspects lock markers under one directory
#[derive(Clone, Debug)]
pub struct LockManager {
    dir: PathBuf,
}

impl LockManager {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Location of the marker for `key`
    #[must_use]
    pub fn marker_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.lock"))
    }

    /// Whether the marker for `key` currently exists
    #[must_use]
    pub fn is_locked(&self, key: &str) -> bool {
        self.marker_path(key).is_file()
    }

    /// Take the lock, failing with [`Error::AlreadyLocked`] if it is held
    pub fn acquire(&self, key: &str) -> Result<LockGuard> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.marker_path(key);
        let mut marker = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyLocked(key.to_string()));
            }
            Err(e) => return Err(Error::Io(e)),
        };
        // Owner pid, for whoever has to clear a stale marker
        if let Err(e) = writeln!(marker, "{}", std::process::id()) {
            debug!("Could not record owner in {}: {}", path.display(), e);
        }
        debug!("Acquired lock {}", path.display());

        Ok(LockGuard {
            key: key.to_string(),
            path,
        })
    }

    /// Remove the marker for `key`; an absent marker is not an error
    pub fn release(&self, key: &str) -> Result<()> {
        remove_marker(&self.marker_path(key))
    }
}

/// A held lock; dropping it removes the marker
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    path: PathBuf,
}

impl LockGuard {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match remove_marker(&self.path) {
            Ok(()) => debug!("Released lock {}", self.path.display()),
            Err(e) => error!("Failed to release lock {}: {e}", self.path.display()),
        }
    }
}

fn remove_marker(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}
