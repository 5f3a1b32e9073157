//! Cross-process mutual exclusion for sync runs
//!
//! A [`ProcessLock`] holds an OS-native exclusive advisory lock on a dedicated
//! lock file (flock on POSIX, LockFileEx on Windows, both behind
//! `fs2::FileExt`). Locking the open file descriptor, instead of testing for
//! the file's existence, closes the check-then-act race two concurrent runs
//! would otherwise hit.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive lock on a file path, held for the lifetime of one sync run.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
    handle: Option<File>,
}

impl ProcessLock {
    /// Lock scoped to the given path. The file is created on `acquire`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: None,
        }
    }

    /// Lock scoped to a unique temporary path, so concurrently running tests
    /// never contend with each other or with a real sync run.
    pub fn for_testing(label: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "repodock-{}-{}.lock",
            label,
            std::process::id()
        ));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.handle.is_some()
    }

    /// Try to take the lock without blocking.
    ///
    /// Returns `false` if another process (or another handle in this process)
    /// already holds it. Returns `Err` only when the lock file itself cannot
    /// be created.
    pub fn acquire(&mut self) -> Result<bool> {
        if self.handle.is_some() {
            return Ok(true);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create lock directory: {}", parent.display())
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open lock file: {}", self.path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired process lock: {}", self.path.display());
                self.handle = Some(file);
                Ok(true)
            }
            Err(_) => {
                debug!("Process lock already held: {}", self.path.display());
                Ok(false)
            }
        }
    }

    /// Release the lock and remove the lock file.
    ///
    /// Safe to call repeatedly, and safe to call when `acquire` never ran or
    /// returned `false`.
    pub fn release(&mut self) {
        if let Some(file) = self.handle.take() {
            if let Err(e) = file.unlock() {
                warn!("Failed to unlock {}: {}", self.path.display(), e);
            }
            drop(file);

            if let Err(e) = std::fs::remove_file(&self.path) {
                if self.path.exists() {
                    debug!("Could not remove lock file {}: {}", self.path.display(), e);
                }
            }
        }
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}
