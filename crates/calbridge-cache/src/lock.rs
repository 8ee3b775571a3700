//! Exclusive worker lock for one state database
//!
//! Only one process may run sync batches against a state file: two workers
//! would each load, extend and save the same identity map, and the second
//! save drops the first one's links. `calbridge run` and `calbridge sync`
//! take this lock before touching any pair. Read-only commands do not.
//!
//! The lock is an advisory `flock` on `<state file>.lock`, released by the
//! OS when the holder exits, so a crashed daemon never leaves it stuck.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::CacheError;

/// Held while this process is the sync worker for a state database
#[derive(Debug)]
pub struct WorkerLock {
    file: File,
    path: PathBuf,
}

/// `state.db` → `state.db.lock`
pub fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

impl WorkerLock {
    /// Takes the worker lock for the state file at `db_path` without waiting
    ///
    /// # Errors
    /// [`CacheError::WorkerBusy`] if another process holds it,
    /// [`CacheError::ConnectionFailed`] if the lock file cannot be opened.
    pub fn acquire(db_path: &Path) -> Result<Self, CacheError> {
        let path = lock_path(db_path);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                CacheError::ConnectionFailed(format!("cannot create {}: {e}", dir.display()))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("cannot open {}: {e}", path.display()))
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(CacheError::WorkerBusy(path.display().to_string()));
        }

        // pid is informational only
        if file.set_len(0).is_ok() {
            let _ = writeln!(file, "{}", std::process::id());
        }

        debug!(path = %path.display(), "Worker lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock now instead of at drop
    pub fn release(self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %e, "Unlock failed, closing file instead");
        }
        debug!(path = %self.path.display(), "Worker lock released");
    }
}
