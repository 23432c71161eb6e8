//! Per-symbol digit history.
//!
//! A bounded ring buffer of trailing digits with a run-length index kept
//! alongside it, so cluster counts per digit are available in O(1) after
//! every append.
//!
//! Positions are absolute tick sequence numbers (0 for the first tick ever
//! appended). Eviction moves the window start forward but never renumbers
//! anything, so a position stored by a tracker stays meaningful until it
//! falls out of the window.

use std::collections::VecDeque;

use crate::types::Digit;

/// Default window size.
pub const DEFAULT_CAPACITY: usize = 50;

/// Smallest usable window: isolation checks look one tick either side.
pub const MIN_CAPACITY: usize = 3;

/// A maximal run of one digit inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    digit: Digit,
    start: u64,
    len: u64,
}

impl Run {
    fn is_cluster(&self) -> bool {
        self.len >= 2
    }
}

/// Clusters of one digit currently inside the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterSummary {
    pub count: u32,
    /// Sequence position where the most recent cluster ends.
    pub last_end: Option<u64>,
}

/// Bounded, ordered sequence of recent digits for one symbol.
#[derive(Debug, Clone)]
pub struct DigitHistory {
    capacity: usize,
    digits: VecDeque<Digit>,
    next_seq: u64,
    runs: VecDeque<Run>,
    clusters: [ClusterSummary; 10],
}

impl DigitHistory {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity >= MIN_CAPACITY, "history window too small");
        let capacity = capacity.max(MIN_CAPACITY);
        Self {
            capacity,
            digits: VecDeque::with_capacity(capacity),
            next_seq: 0,
            runs: VecDeque::new(),
            clusters: [ClusterSummary::default(); 10],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    /// Append one digit, evicting the oldest when full.
    pub fn append(&mut self, digit: Digit) {
        if self.digits.len() == self.capacity {
            self.evict_front();
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.digits.push_back(digit);

        if let Some(run) = self.runs.back_mut().filter(|run| run.digit == digit) {
            run.len += 1;
            let summary = &mut self.clusters[digit.index()];
            if run.len == 2 {
                summary.count += 1;
            }
            summary.last_end = Some(seq);
        } else {
            self.runs.push_back(Run {
                digit,
                start: seq,
                len: 1,
            });
        }

        debug_assert!(self.digits.len() <= self.capacity);
        #[cfg(debug_assertions)]
        for d in Digit::ALL {
            debug_assert_eq!(
                self.clusters[d.index()],
                scan_clusters(self.window_start(), self.digits.iter().copied(), d),
                "run index diverged from rescan for digit {d}"
            );
        }
    }

    fn evict_front(&mut self) {
        if self.digits.pop_front().is_none() {
            return;
        }
        let Some(front) = self.runs.front_mut() else {
            return;
        };

        let was_cluster = front.is_cluster();
        front.start += 1;
        front.len -= 1;

        if was_cluster && !front.is_cluster() {
            // The oldest run is never the most recent cluster unless it is
            // the only one, so last_end only needs clearing at zero.
            let summary = &mut self.clusters[front.digit.index()];
            summary.count -= 1;
            if summary.count == 0 {
                summary.last_end = None;
            }
        }
        if front.len == 0 {
            self.runs.pop_front();
        }
    }

    /// Drop all digits. Sequence numbering continues.
    pub fn clear(&mut self) {
        self.digits.clear();
        self.runs.clear();
        self.clusters = [ClusterSummary::default(); 10];
    }

    /// Ordered copy of the current window.
    pub fn snapshot(&self) -> Vec<Digit> {
        self.digits.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Digit> + '_ {
        self.digits.iter().copied()
    }

    /// Sequence position of the oldest digit in the window.
    pub fn window_start(&self) -> u64 {
        self.next_seq - self.digits.len() as u64
    }

    /// Sequence position of the newest digit, if any.
    pub fn last_seq(&self) -> Option<u64> {
        if self.digits.is_empty() {
            None
        } else {
            Some(self.next_seq - 1)
        }
    }

    /// Digit at an absolute sequence position, if still in the window.
    pub fn get(&self, seq: u64) -> Option<Digit> {
        let start = self.window_start();
        if seq < start || seq >= self.next_seq {
            return None;
        }
        self.digits.get((seq - start) as usize).copied()
    }

    /// Cluster count and most recent cluster end for one digit.
    pub fn clusters(&self, digit: Digit) -> ClusterSummary {
        self.clusters[digit.index()]
    }

    /// For each position in the window, the length of the cluster it
    /// belongs to, or 0 if it is not part of a cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.digits.len());
        for run in &self.runs {
            let size = if run.is_cluster() { run.len as usize } else { 0 };
            sizes.extend(std::iter::repeat(size).take(run.len as usize));
        }
        sizes
    }
}

impl Default for DigitHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Count clusters of `target` by scanning a window from scratch.
///
/// `window_start` is the sequence position of the first element. This is
/// the reference the incremental run index is checked against.
pub fn scan_clusters(
    window_start: u64,
    window: impl IntoIterator<Item = Digit>,
    target: Digit,
) -> ClusterSummary {
    let mut summary = ClusterSummary::default();
    let mut run_len = 0u64;

    for (offset, digit) in window.into_iter().enumerate() {
        if digit == target {
            run_len += 1;
            if run_len == 2 {
                summary.count += 1;
            }
            if run_len >= 2 {
                summary.last_end = Some(window_start + offset as u64);
            }
        } else {
            run_len = 0;
        }
    }
    summary
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
