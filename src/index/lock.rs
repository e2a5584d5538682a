//! Whole-file advisory locking
//!
//! Locks are taken with `flock(2)` on a duplicate of the handle's descriptor.
//! The duplicate shares the open file description, so the lock belongs to the
//! handle that opened the index file and two handles in one process exclude
//! each other just like two processes do.

use std::fs::File;

use tracing::{debug, trace};

use crate::index::error::{DbError, Result};

/// Requested lock mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Read sequences; any number of holders
    Shared,
    /// Mutations; a single holder
    Exclusive,
}

/// A held lock on the index file, released on drop
#[derive(Debug)]
pub struct IndexLock {
    file: Option<File>,
    mode: LockMode,
}

impl IndexLock {
    /// Block until the lock is granted
    pub fn acquire(file: &File, mode: LockMode) -> Result<Self> {
        let handle = file.try_clone().map_err(DbError::Lock)?;
        trace!(?mode, "waiting for index lock");
        lock_file(&handle, mode)?;
        debug!(?mode, "acquired index lock");
        Ok(Self {
            file: Some(handle),
            mode,
        })
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Release the lock; calling it again is a no-op
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            unlock_file(&file);
            debug!(mode = ?self.mode, "released index lock");
        }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(unix)]
fn lock_file(file: &File, mode: LockMode) -> Result<()> {
    use libc::{flock, LOCK_EX, LOCK_SH};
    use std::os::unix::io::AsRawFd;

    let operation = match mode {
        LockMode::Shared => LOCK_SH,
        LockMode::Exclusive => LOCK_EX,
    };
    loop {
        // SAFETY: the descriptor is owned by `file` and open for the call
        let rc = unsafe { flock(file.as_raw_fd(), operation) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(DbError::Lock(err));
        }
    }
}

#[cfg(unix)]
fn unlock_file(file: &File) {
    use libc::{flock, LOCK_UN};
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and open for the call
    let rc = unsafe { flock(file.as_raw_fd(), LOCK_UN) };
    if rc != 0 {
        tracing::warn!(error = %std::io::Error::last_os_error(), "failed to unlock index file");
    }
}

// Advisory locking is only implemented for unix targets
#[cfg(not(unix))]
fn lock_file(_file: &File, _mode: LockMode) -> Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock_file(_file: &File) {}
