use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::StoreError;

/// Run-level mutual exclusion over one state file.
///
/// Backed by a non-blocking exclusive `flock`, so a crashed run never leaves a stale lock:
/// the kernel drops it together with the descriptor.
#[derive(Debug, Clone)]
pub struct RunLock {
    path: PathBuf,
}

/// Held lock. Released on drop.
pub struct RunLockGuard {
    _file: File,
    path: PathBuf,
}

impl fmt::Debug for RunLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLockGuard")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        debug!(target: "rotor.store", path = %self.path.display(), "run lock released");
    }
}

impl RunLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock or fail with [`StoreError::Locked`] when another run holds it.
    pub fn try_acquire(&self) -> Result<RunLockGuard, StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;

        match try_flock_exclusive(&file) {
            Ok(true) => {}
            Ok(false) => {
                return Err(StoreError::Locked {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        }

        // Holder pid, for operators inspecting a stuck lock.
        let _ = file
            .set_len(0)
            .and_then(|_| writeln!(file, "{}", std::process::id()));

        debug!(target: "rotor.store", path = %self.path.display(), "run lock acquired");
        Ok(RunLockGuard {
            _file: file,
            path: self.path.clone(),
        })
    }
}

fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: `fd` is owned by `file`, which outlives the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}
