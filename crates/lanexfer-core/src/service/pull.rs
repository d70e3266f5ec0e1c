//! File handles for clients pulling a file out.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::reaper::Reap;
use super::root::Root;
use super::SourceEndpoint;
use crate::checksum;
use crate::config::ServiceConfig;
use crate::error::{Result, TransferError};
use crate::sync::lock;

struct PullHandle {
    path: PathBuf,
    file: Mutex<File>,
    last_used: Mutex<Instant>,
}

/// Serves positioned reads of files under a root directory.
pub struct PullService {
    root: Root,
    config: ServiceConfig,
    handles: Mutex<HashMap<String, Arc<PullHandle>>>,
}

impl PullService {
    pub fn new(root: &Path, config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            root: Root::new(root, config.confine_to_root)?,
            config,
            handles: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        self.root.dir()
    }

    pub fn handle_count(&self) -> usize {
        lock(&self.handles).len()
    }
}

impl SourceEndpoint for PullService {
    fn get_size(&self, path: &Path) -> Result<Option<u64>> {
        let full = self.root.resolve(path)?;
        Ok(Some(std::fs::metadata(full)?.len()))
    }

    fn get_checksum(&self, path: &Path) -> Result<String> {
        let full = self.root.resolve(path)?;
        Ok(checksum::sha256_path(&full)?)
    }

    fn open_handle(&self, path: &Path) -> Result<String> {
        let full = self.root.resolve(path)?;
        let file = File::open(&full)?;
        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(handle = %id, path = %full.display(), "pull handle opened");
        lock(&self.handles).insert(
            id.clone(),
            Arc::new(PullHandle {
                path: full,
                file: Mutex::new(file),
                last_used: Mutex::new(Instant::now()),
            }),
        );
        Ok(id)
    }

    fn close_handle(&self, handle: &str) -> Result<()> {
        if lock(&self.handles).remove(handle).is_some() {
            tracing::debug!(handle, "pull handle closed");
        }
        Ok(())
    }

    fn read(&self, handle: &str, start: u64, size: u64) -> Result<Vec<u8>> {
        let h = lock(&self.handles)
            .get(handle)
            .cloned()
            .ok_or_else(|| TransferError::UnknownHandle(handle.to_string()))?;
        *lock(&h.last_used) = Instant::now();

        let mut file = lock(&h.file);
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::with_capacity(size.min(1 << 24) as usize);
        Read::take(&mut *file, size).read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Reap for PullService {
    fn reap_idle(&self) -> usize {
        let timeout = self.config.idle_timeout();
        let mut handles = lock(&self.handles);
        let before = handles.len();
        handles.retain(|id, h| {
            let keep = lock(&h.last_used).elapsed() < timeout;
            if !keep {
                tracing::info!(handle = %id, path = %h.path.display(), "closing idle pull handle");
            }
            keep
        });
        before - handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(dir: &Path) -> PullService {
        std::fs::write(dir.join("data.bin"), b"0123456789").unwrap();
        PullService::new(dir, ServiceConfig::default()).unwrap()
    }

    #[test]
    fn size_checksum_and_reads() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let p = Path::new("data.bin");
        assert_eq!(svc.get_size(p).unwrap(), Some(10));
        assert_eq!(svc.get_checksum(p).unwrap().len(), 64);

        let h = svc.open_handle(p).unwrap();
        assert_eq!(svc.read(&h, 3, 4).unwrap(), b"3456");
        assert_eq!(svc.read(&h, 8, 4).unwrap(), b"89");
        svc.close_handle(&h).unwrap();
        assert!(matches!(svc.read(&h, 0, 1), Err(TransferError::UnknownHandle(_))));
    }

    #[test]
    fn confined_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        assert!(matches!(
            svc.open_handle(Path::new("../../etc/passwd")),
            Err(TransferError::OutsideRoot(_))
        ));
    }

    #[test]
    fn idle_handles_are_reaped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), b"x").unwrap();
        let svc = PullService::new(
            dir.path(),
            ServiceConfig {
                idle_timeout_secs: 0,
                ..Default::default()
            },
        )
        .unwrap();
        svc.open_handle(Path::new("data.bin")).unwrap();
        assert_eq!(svc.reap_idle(), 1);
        assert_eq!(svc.handle_count(), 0);
    }
}
