//! Block interval tracking.
//!
//! [`IntervalSet`] is the pure structure: an ordered, disjoint,
//! non-adjacent list of closed block ranges. [`BlockIntervals`] wraps it
//! with the pipeline's progress semantics — the `prev`/`next` persisted
//! extent, the scheduler's reserved range, and the gap computation that
//! drives backfill.

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{PipelineError, StoreError};
use crate::types::{ProcessKind, Progress};
use crate::warehouse::Warehouse;

/// A closed range of block numbers, `low ≤ high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub low: u64,
    pub high: u64,
}

impl Interval {
    pub fn new(low: u64, high: u64) -> Self {
        debug_assert!(low <= high);
        Self { low, high }
    }

    pub fn point(n: u64) -> Self {
        Self { low: n, high: n }
    }

    pub fn contains(&self, n: u64) -> bool {
        self.low <= n && n <= self.high
    }

    pub fn len(&self) -> u64 {
        self.high - self.low + 1
    }

    pub fn is_empty(&self) -> bool {
        false // a closed interval always holds at least one block
    }
}

/// Ordered, disjoint, non-adjacent intervals.
///
/// Invariant: for any two intervals `i < j`,
/// `intervals[i].high + 1 < intervals[j].low`; adjacent intervals are
/// always merged.
#[derive(Debug, Clone, Default)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from unsorted intervals; zero-valued placeholders are dropped.
    pub fn from_intervals(seed: impl IntoIterator<Item = Interval>) -> Self {
        let mut set = Self::new();
        for iv in seed {
            if iv.high == 0 && iv.low == 0 {
                continue;
            }
            set.intervals.push(iv);
        }
        set.intervals.sort_by_key(|iv| iv.low);
        set
    }

    /// First index whose interval starts at or above `block`.
    fn search(&self, block: u64) -> usize {
        self.intervals.partition_point(|iv| iv.low < block)
    }

    /// Record one block. Returns `true` if the set changed.
    ///
    /// Four cases, in order: extend the top of the preceding interval
    /// (merging forward when it closes a gap), extend the bottom of the
    /// following interval, already-contained no-op, or insert a singleton.
    pub fn add(&mut self, n: u64) -> bool {
        let i = self.search(n);

        // already contained
        if i < self.intervals.len() && self.intervals[i].low == n {
            return false;
        }
        if i > 0 && self.intervals[i - 1].high >= n {
            return false;
        }

        // extends the top of the preceding interval
        if i > 0 && self.intervals[i - 1].high + 1 == n {
            self.intervals[i - 1].high = n;
            if i < self.intervals.len() && self.intervals[i].low == n + 1 {
                self.intervals[i - 1].high = self.intervals[i].high;
                self.intervals.remove(i);
            }
            return true;
        }

        // extends the bottom of the following interval
        if i < self.intervals.len() && self.intervals[i].low == n + 1 {
            self.intervals[i].low = n;
            return true;
        }

        self.intervals.insert(i, Interval::point(n));
        true
    }

    /// The uncovered ranges between adjacent intervals. Open ends are not
    /// gaps.
    pub fn gaps(&self) -> Vec<Interval> {
        self.intervals
            .windows(2)
            .map(|pair| Interval::new(pair[0].high + 1, pair[1].low - 1))
            .collect()
    }

    /// The interval containing `n`, if any.
    pub fn containing(&self, n: u64) -> Option<Interval> {
        let i = self.search(n);
        if i < self.intervals.len() && self.intervals[i].low == n {
            return Some(self.intervals[i]);
        }
        if i > 0 && self.intervals[i - 1].contains(n) {
            return Some(self.intervals[i - 1]);
        }
        None
    }

    /// The interval covering the most blocks.
    pub fn largest(&self) -> Option<Interval> {
        self.intervals.iter().copied().max_by_key(Interval::len)
    }

    pub fn first(&self) -> Option<Interval> {
        self.intervals.first().copied()
    }

    pub fn last(&self) -> Option<Interval> {
        self.intervals.last().copied()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn as_slice(&self) -> &[Interval] {
        &self.intervals
    }
}

struct TrackerState {
    working: IntervalSet,
    /// Last persisted extent observed from the warehouse.
    prev: Option<Interval>,
    /// Current extent to be upserted by `save_next`.
    next: Option<Interval>,
    /// Block times of the `next` endpoints, when observed this run.
    next_low_time: i64,
    next_hi_time: i64,
    /// Range the scheduler has handed out.
    scheduled: Option<Interval>,
}

impl TrackerState {
    /// `next` follows the interval that currently contains `prev.low`, or
    /// the single largest interval while `prev` is empty.
    fn refresh_next(&mut self) {
        self.next = match self.prev {
            Some(prev) => self.working.containing(prev.low).or(self.next),
            None => self.working.largest(),
        };
    }
}

/// Process-wide tracker of persisted block numbers.
///
/// One mutex guards all mutation; `save_next` holds it across the
/// progress upsert so persisted progress rows are strictly monotonic.
pub struct BlockIntervals {
    state: Mutex<TrackerState>,
}

impl BlockIntervals {
    /// Start from an already-known set of persisted intervals.
    pub fn new(seed: Vec<Interval>) -> Self {
        let working = IntervalSet::from_intervals(seed);
        let largest = working.largest();
        Self {
            state: Mutex::new(TrackerState {
                working,
                prev: largest,
                next: largest,
                next_low_time: 0,
                next_hi_time: 0,
                scheduled: None,
            }),
        }
    }

    /// Reconstruct the tracker from the warehouse: the progress row seeds
    /// the contiguous extent, and block numbers stored outside it recover
    /// intervals from interrupted runs.
    pub async fn load(warehouse: &dyn Warehouse) -> Result<Self, PipelineError> {
        let progress = warehouse.query_progress(ProcessKind::AddTransaction).await?;

        let seed = match progress {
            Some(p) => {
                if p.hi_block < p.low_block {
                    return Err(StoreError::CorruptProgress {
                        hi: p.hi_block,
                        low: p.low_block,
                    }
                    .into());
                }
                vec![Interval::new(p.low_block, p.hi_block)]
            }
            None => vec![],
        };
        let tracker = Self::new(seed);

        {
            let mut state = tracker.state.lock().await;
            let (low, high) = match state.prev {
                Some(p) => (p.low, p.high),
                None => (0, 0),
            };
            let stray = warehouse.query_block_numbers_outside(low, high).await?;
            for number in stray {
                state.working.add(number);
            }
            state.refresh_next();
            if let (Some(first), Some(last)) = (state.working.first(), state.working.last()) {
                state.scheduled = Some(Interval::new(first.low, last.high));
            }
            info!(
                intervals = state.working.len(),
                gaps = state.working.gaps().len(),
                "interval tracker loaded"
            );
        }
        Ok(tracker)
    }

    /// Record a persisted block and refresh the pending extent.
    pub async fn add_block(&self, number: u64, block_time: i64) {
        let mut state = self.state.lock().await;
        if state.working.add(number) {
            state.refresh_next();
            if let Some(next) = state.next {
                if next.low == number {
                    state.next_low_time = block_time;
                }
                if next.high == number {
                    state.next_hi_time = block_time;
                }
            }
        }
    }

    /// Upsert the progress row when the pending extent moved.
    pub async fn save_next(&self, warehouse: &dyn Warehouse) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        let next = match state.next {
            Some(next) if state.prev != Some(next) => next,
            _ => return Ok(()),
        };
        let progress = Progress {
            kind: ProcessKind::AddTransaction,
            hi_block: next.high,
            low_block: next.low,
            hi_block_time: state.next_hi_time,
            low_block_time: state.next_low_time,
        };
        warehouse.upsert_progress(&progress).await?;
        debug!(low = next.low, high = next.high, "progress saved");
        state.prev = Some(next);
        Ok(())
    }

    pub async fn gaps(&self) -> Vec<Interval> {
        self.state.lock().await.working.gaps()
    }

    pub async fn scheduled(&self) -> Option<Interval> {
        self.state.lock().await.scheduled
    }

    pub async fn set_scheduled(&self, interval: Interval) {
        self.state.lock().await.scheduled = Some(interval);
    }

    /// Snapshot of the working set, for status reporting and tests.
    pub async fn working(&self) -> IntervalSet {
        self.state.lock().await.working.clone()
    }

    pub async fn next_extent(&self) -> Option<Interval> {
        self.state.lock().await.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(seed: &[(u64, u64)]) -> IntervalSet {
        IntervalSet::from_intervals(seed.iter().map(|&(low, high)| Interval::new(low, high)))
    }

    fn ranges(s: &IntervalSet) -> Vec<(u64, u64)> {
        s.as_slice().iter().map(|iv| (iv.low, iv.high)).collect()
    }

    #[test]
    fn add_to_empty_creates_singleton() {
        let mut s = IntervalSet::new();
        assert!(s.add(15));
        assert_eq!(ranges(&s), vec![(15, 15)]);
    }

    #[test]
    fn add_extends_top_of_interval() {
        let mut s = set(&[(20, 30), (5, 10), (50, 55)]);
        assert!(s.add(31));
        assert_eq!(ranges(&s), vec![(5, 10), (20, 31), (50, 55)]);
    }

    #[test]
    fn add_extends_bottom_of_interval() {
        // S5: {[20,30],[5,10],[50,55]} + 19 → {[5,10],[19,30],[50,55]}
        let mut s = set(&[(20, 30), (5, 10), (50, 55)]);
        assert!(s.add(19));
        assert_eq!(ranges(&s), vec![(5, 10), (19, 30), (50, 55)]);
    }

    #[test]
    fn add_merges_adjacent_intervals() {
        // S6: {[20,30],[5,18],[50,55]} + 19 → {[5,30],[50,55]}
        let mut s = set(&[(20, 30), (5, 18), (50, 55)]);
        assert!(s.add(19));
        assert_eq!(ranges(&s), vec![(5, 30), (50, 55)]);
    }

    #[test]
    fn add_contained_is_noop() {
        let mut s = set(&[(20, 30)]);
        assert!(!s.add(25));
        assert!(!s.add(20));
        assert!(!s.add(30));
        assert_eq!(ranges(&s), vec![(20, 30)]);
    }

    #[test]
    fn add_above_and_below_all() {
        let mut s = set(&[(20, 30)]);
        assert!(s.add(3));
        assert!(s.add(60));
        assert_eq!(ranges(&s), vec![(3, 3), (20, 30), (60, 60)]);
    }

    #[test]
    fn add_extends_topmost_and_bottommost() {
        let mut s = set(&[(20, 30), (5, 10), (50, 55)]);
        assert!(s.add(56));
        assert!(s.add(4));
        assert_eq!(ranges(&s), vec![(4, 10), (20, 30), (50, 56)]);
    }

    #[test]
    fn gaps_between_intervals() {
        // S7: gaps of {[5,18],[20,30],[50,55]} → [{19,19},{31,49}]
        let s = set(&[(5, 18), (20, 30), (50, 55)]);
        assert_eq!(
            s.gaps(),
            vec![Interval::new(19, 19), Interval::new(31, 49)]
        );
    }

    #[test]
    fn gaps_exclude_open_ends() {
        assert!(set(&[(5, 10)]).gaps().is_empty());
        assert!(IntervalSet::new().gaps().is_empty());
    }

    #[test]
    fn well_formed_after_random_order_inserts() {
        let mut s = IntervalSet::new();
        // insert 1..=100 in a scrambled but deterministic order
        let mut n = 37u64;
        for _ in 0..100 {
            s.add(n % 100 + 1);
            n = n.wrapping_mul(31).wrapping_add(17);
        }
        for _ in 0..100 {
            // fill the rest
            for b in 1..=100 {
                s.add(b);
            }
        }
        assert_eq!(ranges(&s), vec![(1, 100)]);
    }

    #[test]
    fn invariant_sorted_disjoint_non_adjacent() {
        let mut s = IntervalSet::new();
        for b in [50u64, 10, 52, 12, 51, 11, 80, 13] {
            s.add(b);
        }
        let slice = s.as_slice();
        for pair in slice.windows(2) {
            assert!(
                pair[0].high + 1 < pair[1].low,
                "intervals {:?} violate the invariant",
                slice
            );
        }
    }

    #[test]
    fn containing_and_largest() {
        let s = set(&[(5, 10), (20, 40)]);
        assert_eq!(s.containing(7), Some(Interval::new(5, 10)));
        assert_eq!(s.containing(20), Some(Interval::new(20, 40)));
        assert_eq!(s.containing(15), None);
        assert_eq!(s.largest(), Some(Interval::new(20, 40)));
    }

    #[tokio::test]
    async fn tracker_next_follows_prev_extent() {
        let tracker = BlockIntervals::new(vec![Interval::new(20, 30)]);
        // extend the interval containing prev.low upward and downward
        tracker.add_block(31, 100).await;
        tracker.add_block(19, 90).await;
        let next = tracker.next_extent().await.unwrap();
        assert_eq!(next, Interval::new(19, 31));
    }

    #[tokio::test]
    async fn tracker_merge_widens_next_downward() {
        let tracker =
            BlockIntervals::new(vec![Interval::new(20, 30), Interval::new(5, 18)]);
        tracker.add_block(19, 100).await;
        // merge pulls the lower interval into the one containing prev.low
        assert_eq!(tracker.next_extent().await.unwrap(), Interval::new(5, 30));
    }

    #[tokio::test]
    async fn tracker_next_starts_at_largest_without_prev() {
        let tracker = BlockIntervals::new(vec![]);
        tracker.add_block(7, 10).await;
        tracker.add_block(8, 11).await;
        assert_eq!(tracker.next_extent().await.unwrap(), Interval::new(7, 8));
    }
}
