//! Protocol abstraction: where bytes come from and where they go.
//!
//! The orchestrator only talks to a [`Protocol`]. Each lane opens its own
//! source and destination handle, reads the range the destination last asked
//! for, and submits it back through `write_destination`, which answers with
//! the lane's next range in the same call.

mod local;
mod remote;
mod source;

pub use local::LocalProtocol;
pub use remote::{PullProtocol, PushProtocol};
pub use source::{LocalSource, ReadSeek, Source};

use crate::error::Result;
use crate::saver::{ExtendedInfo, SaveInfo, SaverOptions, WriteOutcome, WriteStatus};

/// A lane's open handle on a source or destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneHandle {
    /// Opaque id (slot number, remote handle or session id).
    pub id: String,
    /// `false` for shared handles the lane must not close on its own.
    pub closable: bool,
}

impl LaneHandle {
    pub fn new(id: impl Into<String>, closable: bool) -> Self {
        Self {
            id: id.into(),
            closable,
        }
    }
}

/// Options common to every protocol that creates a saver.
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Lane count, block and cache sizes, resume/overwrite and artifact naming.
    /// Size and checksum are filled in from the source.
    pub saver: SaverOptions,
    /// Hash the source up front and verify the destination against it.
    pub verify_checksum: bool,
}

/// Per-lane source/destination contract used by lane workers.
pub trait Protocol: Send + Sync {
    /// Total source size; `None` when unknown (single lane, finished on empty read).
    fn file_size(&self) -> Option<u64>;

    fn lane_count(&self) -> usize;

    fn open_source(&self, lane: usize) -> Result<LaneHandle>;

    /// Read up to `size` bytes at `start`. Short only at end of source; empty
    /// marks the end of an unknown-size source.
    fn read_source(&self, lane: usize, handle: &LaneHandle, start: u64, size: u64) -> Result<Vec<u8>>;

    fn close_source(&self, lane: usize, handle: LaneHandle, force: bool) -> Result<()>;

    fn open_destination(&self, lane: usize) -> Result<LaneHandle>;

    /// Submit `data` for `start` (or only ask for the lane's assignment when
    /// `start` is `None`) and get the lane's next range.
    fn write_destination(
        &self,
        lane: usize,
        handle: &LaneHandle,
        start: Option<u64>,
        data: &[u8],
    ) -> Result<WriteOutcome>;

    fn close_destination(&self, lane: usize, handle: LaneHandle, force: bool) -> Result<()>;

    /// End an unknown-size transfer.
    fn finished(&self) -> Result<WriteStatus>;

    /// Persist progress so a later run can resume.
    fn pause(&self) -> Result<()>;

    fn save_info(&self) -> Result<SaveInfo>;

    fn extended_info(&self) -> Result<ExtendedInfo>;

    /// Release every handle and the destination. Idempotent.
    fn close(&self) -> Result<()>;
}
