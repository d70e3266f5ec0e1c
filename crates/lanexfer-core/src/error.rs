//! Error type shared by the saver, protocols, services and the transfer orchestrator.

use std::io;
use std::path::PathBuf;

/// Everything that can go wrong while setting up or driving a transfer.
///
/// Setup errors (`AlreadyExists`, `AlreadyLocked`, `InconsistentResume`,
/// `FileNotFound`, `CorruptTempFile`, `CorruptSidecar`) are returned before any
/// lane starts. Per-write and completion errors surface from lane workers and
/// are recorded on the session.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Destination already exists and overwrite was not requested.
    #[error("destination already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Another saver holds the lock artifact for this destination.
    #[error("destination is locked by another transfer: {}", .0.display())]
    AlreadyLocked(PathBuf),

    /// Caller-supplied size or checksum conflicts with the stored sidecar.
    #[error("resume info [{field}] inconsistent: sidecar has {stored}, caller supplied {supplied}")]
    InconsistentResume {
        field: &'static str,
        stored: String,
        supplied: String,
    },

    /// Temp file named by the sidecar is gone.
    #[error("temp file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Temp file is shorter than the data the sidecar says was committed.
    #[error("temp file {} is {actual} bytes, sidecar committed data up to {expected}", path.display())]
    CorruptTempFile {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Sidecar exists but cannot be parsed.
    #[error("sidecar {} is unreadable: {source}", path.display())]
    CorruptSidecar {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Lane submitted data for an offset other than the one it was assigned.
    #[error("lane {lane}: data offset {got} does not match assigned offset {expected:?}")]
    RangeMismatch {
        lane: usize,
        expected: Option<u64>,
        got: u64,
    },

    /// Source returned no data although the size is known and bytes remain.
    #[error("lane {lane}: source returned no data at offset {start}")]
    EmptyData { lane: usize, start: u64 },

    /// Finished file does not match the expected checksum; the temp file is kept.
    #[error("checksum mismatch: expected {expected}")]
    ChecksumMismatch { expected: String },

    /// `finished()` is only meaningful when the size is unknown.
    #[error("file size is already known; finished() is only valid for unknown-size transfers")]
    SizeAlreadyKnown,

    /// Written range does not fall inside a single pending interval.
    #[error("write [{start}, +{len}) does not fall inside a pending interval")]
    LedgerConflict { start: u64, len: u64 },

    /// `start()` called on a session that already finished.
    #[error("transfer already finished")]
    TransferFinished,

    /// Requested path resolves outside the service root.
    #[error("path is outside the service root: {}", .0.display())]
    OutsideRoot(PathBuf),

    /// Push session id not known to the service.
    #[error("unknown transfer session: {0}")]
    UnknownSession(String),

    /// Pull handle id not known to the service.
    #[error("unknown file handle: {0}")]
    UnknownHandle(String),

    /// Lane index outside the configured lane count.
    #[error("lane {lane} out of range (lane count {count})")]
    LaneOutOfRange { lane: usize, count: usize },

    /// A lane worker thread panicked.
    #[error("lane {0} worker panicked")]
    LanePanicked(usize),

    /// Saver was already closed or finalized.
    #[error("saver is closed")]
    Closed,

    #[error("sidecar encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = TransferError> = std::result::Result<T, E>;
