//! Cross-process mutual exclusion over one clone's store mutations.
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// An advisory file lock serializing concurrent `gitalong` invocations on
/// the same machine against the same store clone.
pub struct StoreLock {
    path: PathBuf,
    file: Option<File>,
}

impl StoreLock {
    pub fn new(lock_path: impl Into<PathBuf>) -> Self {
        StoreLock {
            path: lock_path.into(),
            file: None,
        }
    }

    /// Blocks until the lock is acquired.
    pub fn lock(&mut self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.path)?;
        tracing::debug!(path = %self.path.display(), "acquiring store lock");
        file.lock_exclusive()?;
        self.file = Some(file);
        Ok(())
    }

    pub fn unlock(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            FileExt::unlock(&file)?;
            tracing::debug!(path = %self.path.display(), "released store lock");
        }
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.unlock();
    }
}

pub fn default_lock_path(gitalong_dir: &Path) -> PathBuf {
    gitalong_dir.join(".lock")
}
