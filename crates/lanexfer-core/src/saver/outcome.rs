//! Results of `write_data` and progress snapshots.

use serde::{Deserialize, Serialize};

use super::lane::FetchRange;
use crate::ledger::ByteRange;

/// Status returned with every `write_data` answer. The numeric codes are the
/// wire values used by remote transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteStatus {
    Ok,
    /// Submitted offset is not the lane's assigned offset; nothing was changed.
    RangeMismatch,
    /// Whole file written and finalized.
    Completed,
    /// Whole file written but the checksum did not match.
    ChecksumMismatch,
}

impl WriteStatus {
    pub fn code(self) -> u8 {
        match self {
            WriteStatus::Ok => 0,
            WriteStatus::RangeMismatch => 1,
            WriteStatus::Completed => 2,
            WriteStatus::ChecksumMismatch => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(WriteStatus::Ok),
            1 => Some(WriteStatus::RangeMismatch),
            2 => Some(WriteStatus::Completed),
            3 => Some(WriteStatus::ChecksumMismatch),
            _ => None,
        }
    }
}

/// Answer to `write_data`: status plus the lane's next range to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub status: WriteStatus,
    pub lane: usize,
    /// `None` means the lane has no more work (`nextStart = -1` on the wire).
    pub next: Option<FetchRange>,
}

impl WriteOutcome {
    pub fn idle(lane: usize, status: WriteStatus) -> Self {
        Self {
            status,
            lane,
            next: None,
        }
    }

    /// Wire form of the next start offset (-1 = no more work).
    pub fn next_start(&self) -> i64 {
        self.next.map_or(-1, |f| f.start as i64)
    }

    pub fn next_size(&self) -> u64 {
        self.next.map_or(0, |f| f.size)
    }
}

/// Terminal state of the destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completion {
    #[default]
    Pending,
    Completed,
    /// Finalized with a checksum mismatch; temp file and sidecar kept.
    Corrupt,
}

/// Read-only snapshot of saver progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveInfo {
    /// Total size, `None` while unknown.
    pub file_size: Option<u64>,
    pub written_bytes: u64,
    pub checksum: Option<String>,
    /// Flushes committed by this process.
    pub flushes: u64,
    /// Ranges still pending.
    pub remaining: Vec<ByteRange>,
    pub completion: Completion,
}

impl SaveInfo {
    /// Fraction written in [0.0, 1.0]; 0.0 while the size is unknown.
    pub fn fraction(&self) -> f64 {
        match self.file_size {
            Some(0) => 1.0,
            Some(n) => (self.written_bytes as f64 / n as f64).min(1.0),
            None => 0.0,
        }
    }
}
