//! Saver construction options and on-disk artifact naming.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::storage::sibling_path;

/// Caller-supplied metadata persisted alongside the transfer (source URL, referrer, ...).
pub type ExtendedInfo = BTreeMap<String, serde_json::Value>;

/// Extensions appended to the destination path for the in-progress artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarExtensions {
    pub temp: String,
    pub info: String,
    pub lock: String,
}

impl Default for SidecarExtensions {
    fn default() -> Self {
        Self {
            temp: "tmp".to_string(),
            info: "info".to_string(),
            lock: "lock".to_string(),
        }
    }
}

/// Paths of the destination and its in-progress artifacts.
#[derive(Debug, Clone)]
pub struct SaverPaths {
    pub dest: PathBuf,
    pub temp: PathBuf,
    pub info: PathBuf,
    pub lock: PathBuf,
}

impl SaverPaths {
    pub fn new(dest: &Path, ext: &SidecarExtensions) -> Self {
        Self {
            dest: dest.to_path_buf(),
            temp: sibling_path(dest, &ext.temp),
            info: sibling_path(dest, &ext.info),
            lock: sibling_path(dest, &ext.lock),
        }
    }

    /// Directory holding the destination (temp names in the sidecar are relative to it).
    pub fn dir(&self) -> &Path {
        self.dest.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Options for [`Saver::create`](super::Saver::create).
#[derive(Debug, Clone)]
pub struct SaverOptions {
    /// Pick up an existing sidecar instead of starting over.
    pub resume: bool,
    /// Total size in bytes; `None` when unknown (forces one lane and auto-expand).
    pub expected_size: Option<u64>,
    /// Lowercase hex SHA-256 to verify at finalize; `None` skips verification.
    pub expected_checksum: Option<String>,
    /// Allow replacing an existing destination.
    pub overwrite: bool,
    /// Number of concurrent lanes.
    pub lanes: usize,
    /// Bytes a lane fetches per round trip.
    pub block_size: u64,
    /// Bytes a lane buffers before flushing to the temp file.
    pub cache_bytes_per_lane: u64,
    /// Grow the temp file on demand instead of pre-allocating it.
    pub auto_expand: bool,
    pub extensions: SidecarExtensions,
    pub extended_info: ExtendedInfo,
}

impl Default for SaverOptions {
    fn default() -> Self {
        Self {
            resume: true,
            expected_size: None,
            expected_checksum: None,
            overwrite: false,
            lanes: 1,
            block_size: 4096,
            cache_bytes_per_lane: 1024 * 1024,
            auto_expand: true,
            extensions: SidecarExtensions::default(),
            extended_info: ExtendedInfo::new(),
        }
    }
}
