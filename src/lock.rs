//! Single-instance guard
//!
//! A marker file exists for as long as a process holds the store open.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result};

/// Marker file removed when the guard is dropped
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Create the marker, failing if another instance already holds it
    pub fn acquire(path: &Path) -> Result<Self> {
        Self::acquire_with(path, |file| writeln!(file, "{}", std::process::id()))
    }

    fn acquire_with<F>(path: &Path, stamp: F) -> Result<Self>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyRunning(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        // Guard first so a failed stamp still removes the marker
        let lock = Self {
            path: path.to_path_buf(),
        };
        if let Err(e) = stamp(&mut file) {
            // Close before the guard removes the file
            drop(file);
            return Err(e.into());
        }
        debug!("Acquired instance lock {}", path.display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storefront.lock");

        let lock = InstanceLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert!(matches!(
            InstanceLock::acquire(&path),
            Err(Error::AlreadyRunning(p)) if p == path
        ));

        drop(lock);
        assert!(!path.exists());
        let _again = InstanceLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_failed_pid_write_removes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storefront.lock");

        let result = InstanceLock::acquire_with(&path, |_| Err(io::Error::other("disk full")));
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(!path.exists());

        let lock = InstanceLock::acquire(&path).unwrap();
        let pid = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("storefront.lock");
        assert!(matches!(InstanceLock::acquire(&path), Err(Error::Io(_))));
    }
}
