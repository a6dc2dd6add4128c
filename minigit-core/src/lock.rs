//! Repository-wide advisory locking.
//!
//! Mutating operations hold the exclusive lock, read-only operations the
//! shared one. The lock lives on `.minigit/minigit.lock` and is released
//! when the guard drops (or the process dies).

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const LOCK_FILE: &str = "minigit.lock";
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
pub struct RepoLock {
    file: File,
    mode: LockMode,
}

impl RepoLock {
    pub fn exclusive(repo_dir: &Path, timeout: Duration) -> Result<Self> {
        Self::acquire(repo_dir, LockMode::Exclusive, timeout)
    }

    pub fn shared(repo_dir: &Path, timeout: Duration) -> Result<Self> {
        Self::acquire(repo_dir, LockMode::Shared, timeout)
    }

    fn acquire(repo_dir: &Path, mode: LockMode, timeout: Duration) -> Result<Self> {
        let path = lock_path(repo_dir);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;

        let start = Instant::now();
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => return Ok(RepoLock { file, mode }),
                Err(_) if start.elapsed() >= timeout => return Err(Error::LockUnavailable(path)),
                Err(_) => std::thread::sleep(POLL_INTERVAL),
            }
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path(repo_dir: &Path) -> PathBuf {
    repo_dir.join(LOCK_FILE)
}
