//! Half-open byte range with an optional open end.

use serde::{Deserialize, Serialize};

/// Bytes `[start, end)`. `end == None` is the open-ended range used while the
/// total size is unknown.
///
/// Serialized as a two-element array `[start, end]` (`end` is `null` when open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, Option<u64>)", into = "(u64, Option<u64>)")]
pub struct ByteRange {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive), `None` for open-ended.
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// `[start, ∞)`.
    pub fn open(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Length in bytes; `None` when open-ended.
    pub fn len(&self) -> Option<u64> {
        self.end.map(|e| e.saturating_sub(self.start))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.end, Some(e) if e <= self.start)
    }

    /// True if `offset` lies inside the range.
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && self.end.map_or(true, |e| offset < e)
    }

    /// True if `[start, start + len)` lies fully inside the range.
    pub fn covers(&self, start: u64, len: u64) -> bool {
        self.contains(start) && self.end.map_or(true, |e| start + len <= e)
    }
}

impl From<(u64, Option<u64>)> for ByteRange {
    fn from((start, end): (u64, Option<u64>)) -> Self {
        Self { start, end }
    }
}

impl From<ByteRange> for (u64, Option<u64>) {
    fn from(r: ByteRange) -> Self {
        (r.start, r.end)
    }
}
