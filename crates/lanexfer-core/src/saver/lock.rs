//! Exclusive-create lock marker (`P.lock`).

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, TransferError};

/// Zero-byte marker created with `create_new`; removed on release or drop.
/// A marker left by a crashed process is never removed automatically.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    file: Option<File>,
}

impl LockFile {
    pub fn acquire(path: &Path) -> Result<Self> {
        match File::options().write(true).create_new(true).open(path) {
            Ok(file) => Ok(LockFile {
                path: path.to_path_buf(),
                file: Some(file),
            }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(TransferError::AlreadyLocked(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> io::Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> io::Result<()> {
        if self.file.take().is_some() {
            return super::record::remove_if_exists(&self.path);
        }
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            tracing::warn!(path = %self.path.display(), "failed to remove lock file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.lock");
        let lock = LockFile::acquire(&path).unwrap();
        assert!(path.exists());
        let err = LockFile::acquire(&path).unwrap_err();
        assert!(matches!(err, TransferError::AlreadyLocked(_)));
        lock.release().unwrap();
        assert!(!path.exists());
        let again = LockFile::acquire(&path).unwrap();
        drop(again);
        assert!(!path.exists());
    }

    #[test]
    fn foreign_marker_is_not_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.lock");
        std::fs::write(&path, b"").unwrap();
        assert!(LockFile::acquire(&path).is_err());
        assert!(path.exists());
    }
}
