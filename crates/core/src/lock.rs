//! Advisory run lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::RunError;

/// Exclusive advisory lock on a job's lock file, held for one run.
///
/// The lock is process-scoped and released on drop (or by the OS if the
/// process dies), so a crashed run never wedges the job. The lock file
/// itself is left in place; the tracker knows to skip it during the walk.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Creates the lock file if needed and takes the exclusive lock.
    ///
    /// Fails with [`RunError::LockHeld`] without blocking when another
    /// process already holds it.
    pub fn acquire(path: &Path) -> Result<Self, RunError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|source| RunError::Lock {
                path: path.to_path_buf(),
                source,
            })?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "run lock acquired");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Err(RunError::LockHeld {
                    path: path.to_path_buf(),
                })
            }
            Err(source) => Err(RunError::Lock {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Path of the locked file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %err, "failed to release run lock");
        }
    }
}
