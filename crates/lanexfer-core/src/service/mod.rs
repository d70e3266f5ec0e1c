//! Server side of remote transfers.
//!
//! [`PushService`] hosts savers for clients that push a file in;
//! [`PullService`] serves file reads for clients that pull a file out. Both are
//! in-process and transport-agnostic: a wire transport marshals the
//! [`SaverEndpoint`] / [`SourceEndpoint`] calls and forwards them here, and its
//! client half implements the same traits for the remote protocols.

mod pull;
mod push;
mod reaper;
mod root;

pub use pull::PullService;
pub use push::PushService;
pub use reaper::{Reap, Reaper};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::saver::{ExtendedInfo, SaveInfo, WriteOutcome, WriteStatus};

/// Request to open a saver on the service side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitSaver {
    /// Destination, relative to the service root.
    pub path: PathBuf,
    pub resume: bool,
    pub size: Option<u64>,
    pub checksum: Option<String>,
    pub overwrite: bool,
    #[serde(default)]
    pub extended_info: ExtendedInfo,
    pub lanes: usize,
    pub block_size: u64,
    pub cache_bytes: u64,
    pub auto_expand: bool,
}

/// Answer to [`SaverEndpoint::init_saver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    /// Lanes actually granted (may be fewer than requested).
    pub lane_count: usize,
}

/// Push contract: a saver session addressed by id.
pub trait SaverEndpoint: Send + Sync {
    fn init_saver(&self, req: InitSaver) -> Result<SessionInfo>;

    /// Unknown sessions answer "no more work" rather than failing, so lanes of
    /// a reaped session wind down quietly.
    fn write_data(&self, session: &str, lane: usize, start: Option<u64>, data: &[u8]) -> Result<WriteOutcome>;

    fn flush(&self, session: &str) -> Result<()>;

    fn finished(&self, session: &str) -> Result<WriteStatus>;

    fn close(&self, session: &str) -> Result<()>;

    fn get_save_info(&self, session: &str) -> Result<SaveInfo>;

    fn get_extended_info(&self, session: &str) -> Result<ExtendedInfo>;
}

/// Pull contract: size, checksum and positioned reads of a file by path.
pub trait SourceEndpoint: Send + Sync {
    /// `None` when the source cannot report a size up front.
    fn get_size(&self, path: &Path) -> Result<Option<u64>>;

    fn get_checksum(&self, path: &Path) -> Result<String>;

    fn open_handle(&self, path: &Path) -> Result<String>;

    fn close_handle(&self, handle: &str) -> Result<()>;

    fn read(&self, handle: &str, start: u64, size: u64) -> Result<Vec<u8>>;
}

impl<T: SaverEndpoint + ?Sized> SaverEndpoint for Arc<T> {
    fn init_saver(&self, req: InitSaver) -> Result<SessionInfo> {
        (**self).init_saver(req)
    }

    fn write_data(&self, session: &str, lane: usize, start: Option<u64>, data: &[u8]) -> Result<WriteOutcome> {
        (**self).write_data(session, lane, start, data)
    }

    fn flush(&self, session: &str) -> Result<()> {
        (**self).flush(session)
    }

    fn finished(&self, session: &str) -> Result<WriteStatus> {
        (**self).finished(session)
    }

    fn close(&self, session: &str) -> Result<()> {
        (**self).close(session)
    }

    fn get_save_info(&self, session: &str) -> Result<SaveInfo> {
        (**self).get_save_info(session)
    }

    fn get_extended_info(&self, session: &str) -> Result<ExtendedInfo> {
        (**self).get_extended_info(session)
    }
}

impl<T: SourceEndpoint + ?Sized> SourceEndpoint for Arc<T> {
    fn get_size(&self, path: &Path) -> Result<Option<u64>> {
        (**self).get_size(path)
    }

    fn get_checksum(&self, path: &Path) -> Result<String> {
        (**self).get_checksum(path)
    }

    fn open_handle(&self, path: &Path) -> Result<String> {
        (**self).open_handle(path)
    }

    fn close_handle(&self, handle: &str) -> Result<()> {
        (**self).close_handle(handle)
    }

    fn read(&self, handle: &str, start: u64, size: u64) -> Result<Vec<u8>> {
        (**self).read(handle, start, size)
    }
}
