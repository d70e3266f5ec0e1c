//! Resolving client paths under a service root.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, TransferError};

/// Lexically normalizes `path` (drops `.`, folds `..`) without touching the filesystem.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Service root, stored absolute and normalized.
#[derive(Debug, Clone)]
pub(crate) struct Root {
    dir: PathBuf,
    confine: bool,
}

impl Root {
    pub fn new(dir: &Path, confine: bool) -> Result<Self> {
        let abs = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()?.join(dir)
        };
        Ok(Self {
            dir: normalize(&abs),
            confine,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Joins a client path onto the root; with confinement on, anything that
    /// lands outside the root is `OutsideRoot`.
    pub fn resolve(&self, requested: &Path) -> Result<PathBuf> {
        let joined = normalize(&self.dir.join(requested));
        if self.confine && !joined.starts_with(&self.dir) {
            return Err(TransferError::OutsideRoot(requested.to_path_buf()));
        }
        Ok(joined)
    }
}
