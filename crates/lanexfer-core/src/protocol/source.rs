//! Local source access shared by the local and push protocols.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Mutex;

use super::LaneHandle;
use crate::checksum;
use crate::error::{Result, TransferError};
use crate::sync::lock;

/// Anything readable at arbitrary offsets.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Where the bytes come from.
pub enum Source {
    /// A file re-opened by every lane; allows concurrent reads.
    Path(PathBuf),
    /// An already-open stream. Lanes share it, so transfers over it run on one lane
    /// and the protocol never closes it.
    Reader(Box<dyn ReadSeek + Send>),
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Source::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

enum Slots {
    Path {
        path: PathBuf,
        files: Vec<Mutex<Option<File>>>,
    },
    Reader(Mutex<Box<dyn ReadSeek + Send>>),
}

/// Per-lane readers over a [`Source`].
pub struct LocalSource {
    slots: Slots,
}

impl LocalSource {
    pub fn new(source: Source, lanes: usize) -> Self {
        let slots = match source {
            Source::Path(path) => Slots::Path {
                path,
                files: (0..lanes.max(1)).map(|_| Mutex::new(None)).collect(),
            },
            Source::Reader(r) => Slots::Reader(Mutex::new(r)),
        };
        Self { slots }
    }

    /// Upper bound on lanes this source supports, if any.
    pub fn lane_limit(&self) -> Option<usize> {
        match &self.slots {
            Slots::Path { files, .. } => Some(files.len()),
            Slots::Reader(_) => Some(1),
        }
    }

    pub fn describe(&self) -> String {
        match &self.slots {
            Slots::Path { path, .. } => path.display().to_string(),
            Slots::Reader(_) => "<stream>".to_string(),
        }
    }

    pub fn size(&self) -> Result<u64> {
        match &self.slots {
            Slots::Path { path, .. } => Ok(std::fs::metadata(path)?.len()),
            Slots::Reader(r) => {
                let mut r = lock(r);
                let pos = r.stream_position()?;
                let end = r.seek(SeekFrom::End(0))?;
                r.seek(SeekFrom::Start(pos))?;
                Ok(end)
            }
        }
    }

    /// SHA-256 of the whole source.
    pub fn checksum(&self) -> Result<String> {
        let sum = match &self.slots {
            Slots::Path { path, .. } => checksum::sha256_path(path)?,
            Slots::Reader(r) => checksum::sha256_reader(&mut **lock(r))?,
        };
        Ok(sum)
    }

    pub fn open(&self, lane: usize) -> Result<LaneHandle> {
        match &self.slots {
            Slots::Path { path, files } => {
                let slot = files.get(lane).ok_or(TransferError::LaneOutOfRange {
                    lane,
                    count: files.len(),
                })?;
                let mut file = lock(slot);
                if file.is_none() {
                    *file = Some(File::open(path)?);
                }
                Ok(LaneHandle::new(lane.to_string(), true))
            }
            Slots::Reader(_) => Ok(LaneHandle::new("0", false)),
        }
    }

    /// Read up to `size` bytes at `start`; short only at end of source.
    pub fn read(&self, lane: usize, start: u64, size: u64) -> Result<Vec<u8>> {
        match &self.slots {
            Slots::Path { path, files } => {
                let slot = files.get(lane).ok_or(TransferError::LaneOutOfRange {
                    lane,
                    count: files.len(),
                })?;
                let mut guard = lock(slot);
                if guard.is_none() {
                    *guard = Some(File::open(path)?);
                }
                match guard.as_mut() {
                    Some(file) => read_at(file, start, size),
                    None => Err(TransferError::Closed),
                }
            }
            Slots::Reader(r) => read_at(&mut **lock(r), start, size),
        }
    }

    /// Close the lane's reader. Shared streams are only ever released by their owner.
    pub fn close(&self, lane: usize, handle: &LaneHandle, force: bool) {
        if !handle.closable && !force {
            return;
        }
        if let Slots::Path { files, .. } = &self.slots {
            if let Some(slot) = files.get(lane) {
                lock(slot).take();
            }
        }
    }

    pub fn close_all(&self) {
        if let Slots::Path { files, .. } = &self.slots {
            for slot in files {
                lock(slot).take();
            }
        }
    }
}

fn read_at<R: Read + Seek + ?Sized>(r: &mut R, start: u64, size: u64) -> Result<Vec<u8>> {
    r.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::with_capacity(size.min(1 << 24) as usize);
    Read::take(&mut *r, size).read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn path_source_reads_per_lane() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.bin");
        std::fs::write(&path, b"0123456789").unwrap();
        let src = LocalSource::new(Source::Path(path), 2);
        assert_eq!(src.size().unwrap(), 10);
        assert_eq!(src.lane_limit(), Some(2));

        let h = src.open(1).unwrap();
        assert!(h.closable);
        assert_eq!(src.read(1, 4, 3).unwrap(), b"456");
        assert_eq!(src.read(0, 8, 5).unwrap(), b"89");
        assert!(src.read(0, 10, 5).unwrap().is_empty());
        assert!(matches!(src.read(2, 0, 1), Err(TransferError::LaneOutOfRange { lane: 2, count: 2 })));
    }

    #[test]
    fn reader_source_is_single_lane_and_not_closable() {
        let src = LocalSource::new(Source::Reader(Box::new(Cursor::new(b"hello\n".to_vec()))), 4);
        assert_eq!(src.lane_limit(), Some(1));
        assert_eq!(src.size().unwrap(), 6);
        let h = src.open(0).unwrap();
        assert!(!h.closable);
        assert_eq!(src.read(0, 1, 3).unwrap(), b"ell");
        assert_eq!(
            src.checksum().unwrap(),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
        // checksum rewinds; positioned reads still work
        assert_eq!(src.read(0, 0, 2).unwrap(), b"he");
    }
}
