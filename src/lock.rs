//! Whole-database advisory lock arbitrating single-writer/multi-reader
//! access between OS processes. Uses BSD `flock`, which is associated
//! with the open file description rather than the process, so it
//! behaves correctly even if a process holds multiple handles.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::{Result, VexError};

pub struct DatabaseLock {
    file: File,
}

impl DatabaseLock {
    fn open(path: impl AsRef<Path>) -> Result<File> {
        let path: PathBuf = path.as_ref().to_path_buf();
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| VexError::io(path, e))
    }

    /// Acquires the exclusive lock for the duration of a load. Blocks
    /// until no readers or writers hold the lock.
    pub fn acquire_exclusive(path: impl AsRef<Path>) -> Result<Self> {
        let file = Self::open(&path)?;
        flock(&file, libc::LOCK_EX, &path)?;
        Ok(DatabaseLock { file })
    }

    /// Acquires the shared lock for the duration of a query. Blocks only
    /// while a writer holds the exclusive lock.
    pub fn acquire_shared(path: impl AsRef<Path>) -> Result<Self> {
        let file = Self::open(&path)?;
        flock(&file, libc::LOCK_SH, &path)?;
        Ok(DatabaseLock { file })
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

fn flock(file: &File, op: i32, path: impl AsRef<Path>) -> Result<()> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
    if rc != 0 {
        return Err(VexError::io(
            path.as_ref().to_path_buf(),
            std::io::Error::last_os_error(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_locks_do_not_block_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("vex.lock");
        let _a = DatabaseLock::acquire_shared(&lock_path).unwrap();
        let _b = DatabaseLock::acquire_shared(&lock_path).unwrap();
    }

    #[test]
    fn exclusive_lock_can_be_acquired_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("vex.lock");
        {
            let _a = DatabaseLock::acquire_exclusive(&lock_path).unwrap();
        }
        let _b = DatabaseLock::acquire_exclusive(&lock_path).unwrap();
    }
}
