//! Administrative access baton: an exclusive lock over one
//! administrative directory, so that no more than one edit can hold
//! write access to it at a time.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::Result;
use crate::paths;

/// Grants exclusive write access to the administrative directory at
/// `path` for as long as it is held. Dropping it releases the lock.
pub struct AdminAccess {
    dir: PathBuf,
    lock_file: File,
}

impl AdminAccess {
    /// Opens (creating if necessary) and exclusively locks the admin
    /// directory rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        paths::ensure_admin_dirs(dir)?;
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(paths::lock_path(dir))?;
        lock_file.lock_exclusive()?;
        Ok(AdminAccess {
            dir: dir.to_path_buf(),
            lock_file,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Opens access for a child directory, sharing the same lifetime
    /// discipline but locking its own administrative directory.
    pub fn open_child(&self, child: &Path) -> Result<Self> {
        Self::open(child)
    }
}

impl Drop for AdminAccess {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}
