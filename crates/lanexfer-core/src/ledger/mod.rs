//! Byte-range ledger: the bytes of the destination not yet committed.
//!
//! Intervals are kept sorted by start, pairwise disjoint, and never touching
//! (adjacent intervals are merged). A commit removes the written sub-interval,
//! shrinking or splitting the interval that encloses it.

mod range;

pub use range::ByteRange;

use serde::{Deserialize, Serialize};

/// Ordered list of pending (uncommitted) byte ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    ranges: Vec<ByteRange>,
}

impl Ledger {
    /// Ledger for a fresh transfer: everything pending. `None` size gives the
    /// single open-ended interval `[0, ∞)`; size 0 gives an empty ledger.
    pub fn full(size: Option<u64>) -> Self {
        let ranges = match size {
            Some(0) => Vec::new(),
            Some(n) => vec![ByteRange::new(0, n)],
            None => vec![ByteRange::open(0)],
        };
        Ledger { ranges }
    }

    /// Builds a ledger from stored ranges, restoring the ordering and merge invariants.
    pub fn from_ranges(ranges: Vec<ByteRange>) -> Self {
        let mut l = Ledger { ranges };
        l.merge();
        l
    }

    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total pending bytes; `None` if an open-ended interval is present.
    pub fn pending_bytes(&self) -> Option<u64> {
        self.ranges.iter().map(ByteRange::len).sum()
    }

    /// Highest committed offset implied by the ledger for a file of `size` bytes:
    /// the end of the last committed run. Used to sanity-check a resumed temp file.
    pub fn committed_end(&self, size: Option<u64>) -> u64 {
        match self.ranges.last() {
            None => size.unwrap_or(0),
            Some(last) => match (last.end, size) {
                (Some(end), Some(size)) if end < size => size,
                _ => last.start,
            },
        }
    }

    /// Sorts, drops empty intervals, and merges touching or overlapping intervals.
    pub fn merge(&mut self) {
        self.ranges.retain(|r| !r.is_empty());
        self.ranges.sort_by_key(|r| r.start);
        let mut out: Vec<ByteRange> = Vec::with_capacity(self.ranges.len());
        for r in self.ranges.drain(..) {
            match out.last_mut() {
                Some(prev) if prev.end.map_or(true, |e| r.start <= e) => {
                    prev.end = match (prev.end, r.end) {
                        (Some(a), Some(b)) => Some(a.max(b)),
                        _ => None,
                    };
                }
                _ => out.push(r),
            }
        }
        self.ranges = out;
    }

    /// Removes `[start, start + len)` from the pending set.
    ///
    /// The written range must lie inside a single pending interval; returns
    /// `false` (ledger untouched) otherwise.
    pub fn commit(&mut self, start: u64, len: u64) -> bool {
        if len == 0 {
            return self.ranges.iter().any(|r| r.contains(start));
        }
        let Some(i) = self.ranges.iter().position(|r| r.covers(start, len)) else {
            return false;
        };
        let r = self.ranges[i];
        let written_end = start + len;
        if start == r.start {
            self.ranges[i].start = written_end;
            if self.ranges[i].is_empty() {
                self.ranges.remove(i);
            }
        } else {
            self.ranges[i].end = Some(start);
            let tail = ByteRange {
                start: written_end,
                end: r.end,
            };
            if !tail.is_empty() {
                self.ranges.insert(i + 1, tail);
            }
        }
        true
    }

    /// First interval starting at or after `high_water` (not yet handed to any lane).
    pub fn first_unclaimed(&self, high_water: u64) -> Option<ByteRange> {
        self.ranges.iter().copied().find(|r| r.start >= high_water)
    }

    /// Drops every pending interval (used when an unknown-size transfer is declared finished).
    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}
