//! Durable sidecar record (`P.info`).

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::options::ExtendedInfo;
use crate::error::{Result, TransferError};
use crate::ledger::Ledger;
use crate::storage::sibling_path;

/// Persistent state of one transfer, rewritten after every committed flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    /// Temp file name, relative to the destination directory.
    pub temp_file_name: String,
    /// Total size in bytes, -1 when unknown.
    pub file_size: i64,
    pub written_bytes: u64,
    /// Expected SHA-256 (hex); empty means unverified.
    pub checksum: String,
    #[serde(default)]
    pub extended_info: ExtendedInfo,
    /// Pending (not yet committed) ranges.
    pub store_index: Ledger,
}

impl TransferRecord {
    pub fn size(&self) -> Option<u64> {
        u64::try_from(self.file_size).ok()
    }

    pub fn set_size(&mut self, size: Option<u64>) {
        self.file_size = size.map_or(-1, |s| s as i64);
    }

    pub fn checksum(&self) -> Option<&str> {
        (!self.checksum.is_empty()).then_some(self.checksum.as_str())
    }
}

/// The sidecar file. Stores go through `P.info.part` + rename so a crash
/// mid-write never leaves a truncated record behind.
#[derive(Debug, Clone)]
pub struct Sidecar {
    path: PathBuf,
}

impl Sidecar {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the record; `Ok(None)` when there is no sidecar.
    pub fn load(&self) -> Result<Option<TransferRecord>> {
        read_record(&self.path)
    }

    pub fn store(&self, record: &TransferRecord) -> Result<()> {
        let staging = sibling_path(&self.path, "part");
        let json = serde_json::to_vec_pretty(record)?;
        let mut f = File::create(&staging)?;
        f.write_all(&json)?;
        // durable before it replaces the previous record
        f.sync_all()?;
        drop(f);
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }

    pub fn remove(&self) -> io::Result<()> {
        remove_if_exists(&self.path)
    }
}

/// Read a sidecar directly (used by status tooling that does not own the transfer).
pub fn read_record(path: &Path) -> Result<Option<TransferRecord>> {
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|source| TransferError::CorruptSidecar {
            path: path.to_path_buf(),
            source,
        })
}

pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ByteRange;

    fn record() -> TransferRecord {
        TransferRecord {
            temp_file_name: "file.bin.tmp".to_string(),
            file_size: 100,
            written_bytes: 40,
            checksum: String::new(),
            extended_info: ExtendedInfo::new(),
            store_index: Ledger::from_ranges(vec![ByteRange::new(40, 100)]),
        }
    }

    #[test]
    fn json_uses_camel_case_keys() {
        let v: serde_json::Value = serde_json::to_value(record()).unwrap();
        assert_eq!(v["tempFileName"], "file.bin.tmp");
        assert_eq!(v["fileSize"], 100);
        assert_eq!(v["writtenBytes"], 40);
        assert_eq!(v["storeIndex"], serde_json::json!([[40, 100]]));
    }

    #[test]
    fn unknown_size_is_minus_one() {
        let mut r = record();
        r.set_size(None);
        assert_eq!(r.file_size, -1);
        assert_eq!(r.size(), None);
        r.set_size(Some(7));
        assert_eq!(r.size(), Some(7));
        assert_eq!(r.checksum(), None);
    }

    #[test]
    fn store_then_load_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = Sidecar::new(dir.path().join("file.bin.info"));
        assert!(sidecar.load().unwrap().is_none());
        sidecar.store(&record()).unwrap();
        assert!(!dir.path().join("file.bin.info.part").exists());
        assert_eq!(sidecar.load().unwrap(), Some(record()));
        sidecar.remove().unwrap();
        sidecar.remove().unwrap();
        assert!(!sidecar.exists());
    }

    #[test]
    fn store_replaces_stale_staging_and_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = Sidecar::new(dir.path().join("file.bin.info"));
        // leftover from a store that died before its rename
        std::fs::write(dir.path().join("file.bin.info.part"), b"{\"tempFile").unwrap();
        sidecar.store(&record()).unwrap();

        let mut next = record();
        next.written_bytes = 70;
        next.store_index = Ledger::from_ranges(vec![ByteRange::new(70, 100)]);
        sidecar.store(&next).unwrap();

        assert!(!dir.path().join("file.bin.info.part").exists());
        assert_eq!(read_record(sidecar.path()).unwrap(), Some(next));
    }

    #[test]
    fn garbage_sidecar_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.info");
        std::fs::write(&path, b"{not json").unwrap();
        let err = Sidecar::new(path).load().unwrap_err();
        assert!(matches!(err, TransferError::CorruptSidecar { .. }));
    }
}
