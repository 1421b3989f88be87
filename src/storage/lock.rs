// ============================================================================
// Per-file write locks
// ============================================================================

use crate::core::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Process-wide map from backing file to a binary semaphore.
///
/// Every mutating collection operation holds the guard for its file across
/// the whole read-current / compute-next / persist sequence. Reads of the
/// in-memory snapshot never touch this registry.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<PathBuf, Arc<Semaphore>>>,
}

/// Held lock for one file. Dropping it releases the lock.
#[derive(Debug)]
pub struct FileLockGuard {
    path: PathBuf,
    _permit: OwnedSemaphorePermit,
}

impl FileLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Explicit release; equivalent to dropping the guard.
    pub fn release(self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockStats {
    /// Files that have been locked at least once since the last clear
    pub tracked: usize,
    /// Files whose lock is currently held
    pub held: usize,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &Path) -> PathBuf {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    }

    fn semaphore_for(&self, key: &Path) -> Result<Arc<Semaphore>> {
        let mut locks = self.locks.lock()?;
        let semaphore = locks
            .entry(key.to_path_buf())
            .or_insert_with(|| Arc::new(Semaphore::new(1)));
        Ok(Arc::clone(semaphore))
    }

    /// Waits until no other task holds the lock for `path`, then takes it.
    pub async fn acquire(&self, path: &Path) -> Result<FileLockGuard> {
        let key = Self::key(path);
        loop {
            let semaphore = self.semaphore_for(&key)?;
            match semaphore.acquire_owned().await {
                Ok(permit) => {
                    return Ok(FileLockGuard {
                        path: key,
                        _permit: permit,
                    });
                }
                // closed by clear_all while we were queued
                Err(_) => {
                    debug!(path = %key.display(), "lock cleared while waiting, retrying");
                }
            }
        }
    }

    /// Takes the lock only if it is free right now.
    pub fn try_acquire(&self, path: &Path) -> Result<Option<FileLockGuard>> {
        let key = Self::key(path);
        let semaphore = self.semaphore_for(&key)?;
        Ok(semaphore.try_acquire_owned().ok().map(|permit| FileLockGuard {
            path: key,
            _permit: permit,
        }))
    }

    pub fn is_held(&self, path: &Path) -> Result<bool> {
        let key = Self::key(path);
        let locks = self.locks.lock()?;
        Ok(locks
            .get(&key)
            .is_some_and(|semaphore| semaphore.available_permits() == 0))
    }

    /// Force-releases every lock regardless of outstanding holders.
    ///
    /// Queued waiters are woken and re-queue on a fresh lock. Guards still
    /// alive afterwards no longer exclude anybody. Returns how many locks
    /// were held at the time of the call.
    pub fn clear_all(&self) -> Result<usize> {
        let mut locks = self.locks.lock()?;
        let mut held = 0;
        for (path, semaphore) in locks.drain() {
            if semaphore.available_permits() == 0 {
                held += 1;
                warn!(path = %path.display(), "force-releasing held file lock");
            }
            semaphore.close();
        }
        Ok(held)
    }

    pub fn stats(&self) -> Result<LockStats> {
        let locks = self.locks.lock()?;
        Ok(LockStats {
            tracked: locks.len(),
            held: locks
                .values()
                .filter(|semaphore| semaphore.available_permits() == 0)
                .count(),
        })
    }
}
