//! Per-lane assignment state and the allocation / rebalancing algorithm.
//!
//! All functions here run under the saver's ledger lock. Lane buffers live
//! elsewhere under per-lane locks; only the counters mirrored here are shared.

use serde::{Deserialize, Serialize};

use crate::ledger::{ByteRange, Ledger};

/// The next range a lane should read from the source and submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRange {
    pub start: u64,
    pub size: u64,
}

/// What a lane currently owns.
///
/// The lane owns `[start, end)`; the first `buffered` bytes after `start` are
/// accepted but not yet flushed. `fetch` is the offset the next submission
/// must carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LaneCursor {
    pub start: Option<u64>,
    pub buffered: u64,
    pub end: Option<u64>,
    pub fetch: Option<FetchRange>,
}

impl LaneCursor {
    pub fn is_assigned(&self) -> bool {
        self.start.is_some()
    }

    /// First offset not yet accepted into the lane buffer.
    pub fn position(&self) -> Option<u64> {
        self.start.map(|s| s + self.buffered)
    }

    /// First offset not yet handed out for fetching.
    pub fn frontier(&self) -> Option<u64> {
        match self.fetch {
            Some(f) => Some(f.start + f.size),
            None => self.position(),
        }
    }

    /// Bytes of the assignment nobody has been asked to fetch yet. Open-ended
    /// assignments are never split, so they report nothing.
    pub fn unclaimed(&self) -> u64 {
        match (self.frontier(), self.end) {
            (Some(f), Some(e)) => e.saturating_sub(f),
            _ => 0,
        }
    }

    /// Whole assignment accepted (buffer covers up to `end`).
    pub fn reached_end(&self) -> bool {
        matches!((self.position(), self.end), (Some(p), Some(e)) if p >= e)
    }

    pub fn clear(&mut self) {
        *self = LaneCursor::default();
    }

    fn assign(&mut self, range: ByteRange) {
        *self = LaneCursor {
            start: Some(range.start),
            buffered: 0,
            end: range.end,
            fetch: None,
        };
    }

    /// Sets `fetch` to the next block after `position`, or clears the lane if
    /// nothing is left in its assignment.
    pub fn plan_fetch(&mut self, block_size: u64) {
        if self.fetch.is_some() {
            return;
        }
        let Some(pos) = self.position() else {
            return;
        };
        let size = match self.end {
            Some(e) => block_size.min(e.saturating_sub(pos)),
            None => block_size,
        };
        if size == 0 {
            if self.buffered == 0 {
                self.clear();
            }
            return;
        }
        self.fetch = Some(FetchRange { start: pos, size });
    }
}

/// How a lane got (or did not get) work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Assignment {
    /// Lane still had part of its own range.
    Kept,
    /// Lane claimed a ledger interval nobody had touched.
    Claimed(ByteRange),
    /// Lane took the far half of another lane's remaining range.
    Stolen { from: usize, range: ByteRange },
    /// Nothing left to hand out.
    Idle,
}

/// Gives lane `index` something to do.
///
/// Order: keep the lane's own range; else claim the first ledger interval at
/// or past `high_water`; else split the largest unclaimed remainder among the
/// other lanes at its midpoint, provided it exceeds `cache_bytes`.
pub(crate) fn assign_lane(
    lanes: &mut [LaneCursor],
    index: usize,
    ledger: &Ledger,
    high_water: &mut u64,
    block_size: u64,
    cache_bytes: u64,
) -> Assignment {
    let outcome = if lanes[index].is_assigned() {
        Assignment::Kept
    } else if let Some(range) = ledger.first_unclaimed(*high_water) {
        lanes[index].assign(range);
        *high_water = range.end.unwrap_or(u64::MAX);
        Assignment::Claimed(range)
    } else {
        steal(lanes, index, cache_bytes)
    };
    lanes[index].plan_fetch(block_size);
    outcome
}

fn steal(lanes: &mut [LaneCursor], index: usize, cache_bytes: u64) -> Assignment {
    let busiest = lanes
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(i, l)| (i, l.unclaimed()))
        .filter(|(_, n)| *n > 0)
        .max_by_key(|(_, n)| *n);
    let Some((from, area)) = busiest else {
        return Assignment::Idle;
    };
    if area <= cache_bytes {
        return Assignment::Idle;
    }
    let (Some(frontier), Some(end)) = (lanes[from].frontier(), lanes[from].end) else {
        return Assignment::Idle;
    };
    let split_at = frontier + (area + 1) / 2;
    lanes[from].end = Some(split_at);
    let range = ByteRange::new(split_at, end);
    lanes[index].assign(range);
    Assignment::Stolen { from, range }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(start: u64, buffered: u64, end: u64, fetch: Option<(u64, u64)>) -> LaneCursor {
        LaneCursor {
            start: Some(start),
            buffered,
            end: Some(end),
            fetch: fetch.map(|(start, size)| FetchRange { start, size }),
        }
    }

    #[test]
    fn claims_whole_untouched_interval() {
        let ledger = Ledger::full(Some(10_000));
        let mut lanes = vec![LaneCursor::default(); 2];
        let mut hw = 0;
        let a = assign_lane(&mut lanes, 0, &ledger, &mut hw, 4096, 1024);
        assert_eq!(a, Assignment::Claimed(ByteRange::new(0, 10_000)));
        assert_eq!(hw, 10_000);
        assert_eq!(lanes[0].fetch, Some(FetchRange { start: 0, size: 4096 }));
    }

    #[test]
    fn idle_lane_splits_busiest_at_midpoint() {
        let ledger = Ledger::full(Some(10_000));
        let mut lanes = vec![LaneCursor::default(); 2];
        let mut hw = 0;
        assign_lane(&mut lanes, 0, &ledger, &mut hw, 4096, 1024);
        let a = assign_lane(&mut lanes, 1, &ledger, &mut hw, 4096, 1024);
        // lane 0 has handed out [0, 4096); remainder 5904 splits at 4096 + 2952.
        assert_eq!(
            a,
            Assignment::Stolen {
                from: 0,
                range: ByteRange::new(7048, 10_000)
            }
        );
        assert_eq!(lanes[0].end, Some(7048));
        assert_eq!(lanes[1].fetch, Some(FetchRange { start: 7048, size: 2952 }));
    }

    #[test]
    fn small_remainder_is_not_split() {
        let ledger = Ledger::full(Some(5000));
        let mut lanes = vec![cursor(0, 0, 5000, Some((0, 4096))), LaneCursor::default()];
        let mut hw = 5000;
        let a = assign_lane(&mut lanes, 1, &ledger, &mut hw, 4096, 1024);
        assert_eq!(a, Assignment::Idle);
        assert!(!lanes[1].is_assigned());
        assert_eq!(lanes[0].end, Some(5000));
    }

    #[test]
    fn picks_lane_with_largest_remainder() {
        let ledger = Ledger::full(Some(100_000));
        let mut lanes = vec![
            cursor(0, 0, 20_000, None),
            cursor(20_000, 1000, 90_000, Some((21_000, 1000))),
            LaneCursor::default(),
        ];
        let mut hw = 100_000;
        let a = assign_lane(&mut lanes, 2, &ledger, &mut hw, 1000, 1000);
        match a {
            Assignment::Stolen { from, range } => {
                assert_eq!(from, 1);
                assert_eq!(range, ByteRange::new(22_000 + 34_000, 90_000));
            }
            other => panic!("expected steal, got {other:?}"),
        }
    }

    #[test]
    fn open_ended_lane_is_never_split() {
        let ledger = Ledger::full(None);
        let mut lanes = vec![LaneCursor::default(); 2];
        let mut hw = 0;
        assign_lane(&mut lanes, 0, &ledger, &mut hw, 4096, 1);
        assert_eq!(hw, u64::MAX);
        assert_eq!(lanes[0].fetch, Some(FetchRange { start: 0, size: 4096 }));
        assert_eq!(assign_lane(&mut lanes, 1, &ledger, &mut hw, 4096, 1), Assignment::Idle);
    }

    #[test]
    fn kept_lane_plans_next_block_after_buffer() {
        let ledger = Ledger::full(Some(10_000));
        let mut lanes = vec![cursor(0, 4096, 6000, None)];
        let mut hw = 10_000;
        assert_eq!(assign_lane(&mut lanes, 0, &ledger, &mut hw, 4096, 1 << 20), Assignment::Kept);
        assert_eq!(lanes[0].fetch, Some(FetchRange { start: 4096, size: 1904 }));
    }

    #[test]
    fn resumed_ledger_hands_out_gaps_in_order() {
        let ledger = Ledger::from_ranges(vec![ByteRange::new(100, 200), ByteRange::new(300, 400)]);
        let mut lanes = vec![LaneCursor::default(); 3];
        let mut hw = 0;
        assert_eq!(
            assign_lane(&mut lanes, 0, &ledger, &mut hw, 64, 64),
            Assignment::Claimed(ByteRange::new(100, 200))
        );
        assert_eq!(
            assign_lane(&mut lanes, 1, &ledger, &mut hw, 64, 64),
            Assignment::Claimed(ByteRange::new(300, 400))
        );
        // both remainders are 36 bytes (100 - 64) which does not exceed the cache unit
        assert_eq!(assign_lane(&mut lanes, 2, &ledger, &mut hw, 64, 64), Assignment::Idle);
    }
}
