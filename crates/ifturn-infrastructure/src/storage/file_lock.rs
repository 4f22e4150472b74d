//! Cross-process advisory file locks.

use super::atomic_json::AtomicJsonError;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// An exclusive lock held for as long as the guard lives.
///
/// The lock file itself is left in place on drop: deleting it would let a
/// process that opened the old inode and one that creates a new file both
/// believe they hold the lock.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Blocks until an exclusive lock on `path` is held.
    ///
    /// Call from a blocking context (`spawn_blocking`), never on an async worker.
    pub fn acquire(path: &Path) -> Result<Self, AtomicJsonError> {
        let file = Self::open(path)?;
        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive()
                .map_err(|e| AtomicJsonError::Lock(format!("{}: {}", path.display(), e)))?;
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Takes the lock only if nobody else holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, AtomicJsonError> {
        let file = Self::open(path)?;
        #[cfg(unix)]
        {
            use fs2::FileExt;
            if let Err(e) = file.try_lock_exclusive() {
                if e.kind() == fs2::lock_contended_error().kind() {
                    return Ok(None);
                }
                return Err(AtomicJsonError::Lock(format!("{}: {}", path.display(), e)));
            }
        }
        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<File, AtomicJsonError> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use fs2::FileExt;
            let _ = self.file.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exclusive_between_handles() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".session.lock");
        let held = FileLock::acquire(&path).unwrap();
        assert_eq!(held.path(), path.as_path());
        #[cfg(unix)]
        assert!(FileLock::try_acquire(&path).unwrap().is_none());
        drop(held);
        assert!(FileLock::try_acquire(&path).unwrap().is_some());
        assert!(path.exists());
    }
}
